//! PKCE (RFC 7636) verifier/challenge pairs and the OAuth `state` nonce.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Entropy behind a verifier: 32 bytes encode to exactly the 43-char minimum.
const VERIFIER_BYTES: usize = 32;
const STATE_BYTES: usize = 16;

/// PKCE verifier and the S256 challenge derived from it.
///
/// The verifier is single-use: it is stored on the session at login and
/// discarded once the callback consumes it, whatever the exchange outcome.
#[derive(Clone)]
#[non_exhaustive]
pub struct PkcePair {
    pub code_verifier: String,
    pub code_challenge: String,
}

impl PkcePair {
    /// Generates a fresh verifier and its challenge.
    #[must_use]
    pub fn generate() -> Self {
        let code_verifier = generate_code_verifier();
        let code_challenge = generate_code_challenge(&code_verifier);
        Self {
            code_verifier,
            code_challenge,
        }
    }

    /// Re-derives the challenge from the verifier and compares.
    #[must_use]
    pub fn matches(&self, challenge: &str) -> bool {
        generate_code_challenge(&self.code_verifier) == challenge
    }
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("code_verifier", &"[redacted]")
            .field("code_challenge", &self.code_challenge)
            .finish()
    }
}

/// base64url (unpadded) over `len` bytes from the thread-local CSPRNG.
pub(crate) fn random_url_safe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// A 43-character verifier drawn from the unreserved URL alphabet.
#[must_use]
pub fn generate_code_verifier() -> String {
    random_url_safe(VERIFIER_BYTES)
}

/// `BASE64URL(SHA256(verifier))`, the S256 transform.
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Opaque value echoed back on the callback and compared against the session.
#[must_use]
pub fn generate_state() -> String {
    random_url_safe(STATE_BYTES)
}
