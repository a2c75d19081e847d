//! Bearer token validation for the resource server.
//!
//! A token is accepted or rejected as a whole. Every rejection carries the
//! specific reason so callers can log it, even though the HTTP answer to the
//! client stays uniform.

use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde::Serialize;
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

use crate::claims::ClaimSet;
use crate::error::Error;
use crate::jwks::KeyRing;
use crate::types::KeyId;

/// Outcome of [`TokenValidator::verify`].
pub type ValidationResult = Result<VerifiedClaims, ValidationError>;

/// Why a presented token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("token has expired")]
    Expired,
    #[error("invalid claims: {0}")]
    InvalidClaims(String),
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("invalid token: {0}")]
    InvalidToken(String),
}

impl ValidationError {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Expired => "TOKEN_EXPIRED",
            Self::InvalidClaims(_) => "INVALID_CLAIMS",
            Self::InvalidSignature(_) => "INVALID_SIGNATURE",
            Self::InvalidToken(_) => "INVALID_TOKEN",
        }
    }

    fn from_jwt(err: &jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidIssuer => Self::InvalidClaims("issuer mismatch".into()),
            ErrorKind::InvalidAudience => Self::InvalidClaims("audience mismatch".into()),
            ErrorKind::ImmatureSignature => Self::InvalidClaims("token not yet valid (nbf)".into()),
            ErrorKind::MissingRequiredClaim(claim) => {
                Self::InvalidClaims(format!("missing required claim: {claim}"))
            }
            ErrorKind::InvalidSignature => Self::InvalidSignature("signature mismatch".into()),
            _ => Self::InvalidToken(err.to_string()),
        }
    }
}

/// Claims of a token whose signature, issuer, audience and lifetime all checked out.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct VerifiedClaims {
    inner: ClaimSet,
}

impl VerifiedClaims {
    /// Gets a claim value by key.
    #[must_use]
    pub fn get_claim(&self, key: &str) -> Option<&JsonValue> {
        self.inner.get(key)
    }

    #[must_use]
    pub fn claims(&self) -> &ClaimSet {
        &self.inner
    }

    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.inner.subject()
    }

    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.inner.get_str("iss")
    }

    /// `aud` as a list, whether the token carried a string or an array.
    /// A string audience is one value even when it contains spaces.
    #[must_use]
    pub fn audience(&self) -> Vec<String> {
        match self.inner.get("aud") {
            Some(JsonValue::String(aud)) => vec![aud.clone()],
            Some(JsonValue::Array(values)) => values
                .iter()
                .filter_map(JsonValue::as_str)
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        }
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.timestamp("exp")
    }

    #[must_use]
    pub fn issued_at(&self) -> Option<OffsetDateTime> {
        self.timestamp("iat")
    }

    fn timestamp(&self, key: &str) -> Option<OffsetDateTime> {
        self.inner
            .get_timestamp(key)
            .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
    }
}

/// Verifies bearer tokens minted by one issuer against its key ring.
pub struct TokenValidator {
    key_ring: Arc<KeyRing>,
    issuer: String,
    audience: Option<String>,
    leeway_secs: u64,
}

impl TokenValidator {
    /// The allow-listed algorithm is the key ring's.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for symmetric algorithms, which a published
    /// key set cannot verify.
    pub fn new(key_ring: Arc<KeyRing>, issuer: impl Into<String>) -> Result<Self, Error> {
        if matches!(
            key_ring.algorithm(),
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(Error::Config(
                "symmetric algorithms cannot be verified against a JWKS".into(),
            ));
        }
        Ok(Self {
            key_ring,
            issuer: issuer.into(),
            audience: None,
            leeway_secs: 0,
        })
    }

    /// Require `aud` to contain this value.
    #[must_use]
    pub fn with_audience(mut self, audience: Option<String>) -> Self {
        self.audience = audience;
        self
    }

    /// Clock skew tolerance for `exp`/`nbf`/`iat`.
    #[must_use]
    pub fn with_leeway(mut self, secs: u64) -> Self {
        self.leeway_secs = secs;
        self
    }

    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.key_ring.algorithm()
    }

    #[must_use]
    pub fn key_ring(&self) -> &KeyRing {
        &self.key_ring
    }

    /// Verifies against the configured issuer and audience.
    pub async fn verify(&self, token: &str) -> ValidationResult {
        self.verify_with(token, &self.issuer, self.audience.as_deref())
            .await
    }

    /// Verifies `token` and returns its full claim set.
    pub async fn verify_with(
        &self,
        token: &str,
        expected_issuer: &str,
        expected_audience: Option<&str>,
    ) -> ValidationResult {
        let header = decode_header(token)
            .map_err(|e| ValidationError::InvalidToken(format!("malformed header: {e}")))?;

        let allowed = self.key_ring.algorithm();
        if header.alg != allowed {
            return Err(ValidationError::InvalidToken(format!(
                "algorithm {:?} not allowed",
                header.alg
            )));
        }

        let key = match header.kid {
            Some(kid) => self.key_ring.get_key(&KeyId(kid)).await,
            None => self.key_ring.get_default_key().await,
        }
        .map_err(|e| ValidationError::InvalidSignature(e.to_string()))?;

        let mut validation = Validation::new(allowed);
        validation.leeway = self.leeway_secs;
        validation.validate_nbf = true;
        validation.set_issuer(&[expected_issuer]);
        match expected_audience {
            Some(aud) => {
                validation.set_audience(&[aud]);
                validation.set_required_spec_claims(&["exp", "iss", "aud"]);
            }
            None => {
                validation.validate_aud = false;
                validation.set_required_spec_claims(&["exp", "iss"]);
            }
        }

        let data = decode::<ClaimSet>(token, &key, &validation)
            .map_err(|e| ValidationError::from_jwt(&e))?;

        let claims = VerifiedClaims { inner: data.claims };
        self.check_issued_at(&claims)?;
        Ok(claims)
    }

    /// `iat`, when present, must not lie in the future.
    fn check_issued_at(&self, claims: &VerifiedClaims) -> Result<(), ValidationError> {
        let Some(iat) = claims.claims().get_timestamp("iat") else {
            return Ok(());
        };
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let leeway = i64::try_from(self.leeway_secs).unwrap_or(i64::MAX);
        if iat > now.saturating_add(leeway) {
            return Err(ValidationError::InvalidClaims(
                "token issued in the future (iat)".into(),
            ));
        }
        Ok(())
    }
}
