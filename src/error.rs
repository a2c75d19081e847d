#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Provider discovery failed: {0}")]
    Discovery(String),
    #[error("OAuth2 {operation} failed (status {status:?}): {detail}")]
    OAuth {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },
    #[error("{operation} timed out")]
    Timeout { operation: &'static str },
    #[cfg(any(feature = "oauth", feature = "token"))]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("ID token rejected: {0}")]
    IdToken(String),
    #[error("Key set error: {0}")]
    KeySet(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Classifies a transport failure, keeping timeouts distinct from other HTTP errors.
    #[cfg(any(feature = "oauth", feature = "token"))]
    pub(crate) fn from_transport(operation: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { operation }
        } else {
            Self::Http(err)
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
