use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Opaque session identifier carried in the session cookie.
///
/// 32 random bytes, base64url-encoded. Nothing else about the session
/// travels to the browser.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generates a fresh, unguessable session identifier.
    #[cfg(feature = "oauth")]
    #[must_use]
    pub fn generate() -> Self {
        Self(crate::pkce::random_url_safe(32))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Session ids are bearer secrets; keep them out of logs.
impl std::fmt::Debug for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionId([redacted])")
    }
}

/// JWK key identifier (`kid`).
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct KeyId(pub String);

impl From<&str> for KeyId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_from_string() {
        let id = SessionId::from("sess-abc".to_string());
        assert_eq!(id.to_string(), "sess-abc");
        assert_eq!(id.as_str(), "sess-abc");
    }

    #[cfg(feature = "oauth")]
    #[test]
    fn session_id_generate_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 43);
    }

    #[test]
    fn session_id_debug_redacted() {
        let id = SessionId::from("secret-id".to_string());
        assert!(!format!("{id:?}").contains("secret-id"));
    }

    #[test]
    fn key_id_serde_transparent() {
        let kid = KeyId::from("key-1");
        let json = serde_json::to_string(&kid).unwrap();
        assert_eq!(json, "\"key-1\"");
    }
}
