use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::redirect::found;

/// Default page that renders flow errors.
pub(crate) const DEFAULT_ERROR_PAGE: &str = "/";

/// Authentication errors for the BFF layer.
///
/// Flow errors are terminal for the attempt that raised them: codes and
/// verifiers are single-use, so nothing here is retried.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Callback arrived without a pending login on this session.
    #[error("Session lost before authentication completed")]
    SessionLost,

    /// The provider redirected back with an OAuth `error` parameter.
    #[error("Identity provider error: {error}")]
    ProviderError {
        error: String,
        description: Option<String>,
    },

    /// `state` on the callback differs from the one issued at login.
    #[error("OAuth state mismatch")]
    StateMismatch,

    /// Callback carries neither an error nor a code.
    #[error("Invalid callback: {0}")]
    InvalidCallback(String),

    /// Token endpoint rejected the code or the call failed.
    #[error("Token exchange failed: {0}")]
    ExchangeFailed(String),

    /// Tokens were issued but user claims could not be fetched.
    #[error("Userinfo request failed: {0}")]
    UserInfoFailed(String),

    /// An outbound call to the provider exceeded its deadline.
    #[error("{0} timed out")]
    UpstreamTimeout(String),

    /// No authenticated session on a guarded route.
    #[error("Authentication required")]
    Unauthenticated,

    /// Session store operation failed.
    #[error("Session store error: {0}")]
    Store(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionLost => "SESSION_LOST",
            Self::ProviderError { .. } => "PROVIDER_ERROR",
            Self::StateMismatch => "STATE_MISMATCH",
            Self::InvalidCallback(_) => "INVALID_CALLBACK",
            Self::ExchangeFailed(_) => "EXCHANGE_FAILED",
            Self::UserInfoFailed(_) => "USERINFO_FAILED",
            Self::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            Self::Unauthenticated => "AUTHENTICATION_REQUIRED",
            Self::Store(_) | Self::Config(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this error ends a login attempt and belongs on the error page.
    #[must_use]
    pub fn is_flow_error(&self) -> bool {
        !matches!(
            self,
            Self::Unauthenticated | Self::Store(_) | Self::Config(_)
        )
    }

    /// Redirect to `error_page` carrying the error code.
    ///
    /// Only a provider-supplied description is passed along; internal
    /// details stay in the logs.
    #[must_use]
    pub fn error_page_redirect(&self, error_page: &str) -> Response {
        let mut location = format!("{error_page}?error={}", self.code());
        if let Self::ProviderError {
            description: Some(description),
            ..
        } = self
        {
            location.push_str("&error_description=");
            location.push_str(&urlencoding::encode(description));
        }
        found(&location)
    }

    /// Classifies a failed provider call made during the callback.
    pub(crate) fn from_provider_call(err: crate::error::Error, on_failure: fn(String) -> Self) -> Self {
        match err {
            crate::error::Error::Timeout { operation } => Self::UpstreamTimeout(operation.into()),
            other => on_failure(other.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": self.to_string(), "code": self.code() })),
            )
                .into_response(),
            Self::Store(_) | Self::Config(_) => {
                tracing::error!(error = %self, "Auth internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "Internal error", "code": self.code() })),
                )
                    .into_response()
            }
            _ => self.error_page_redirect(DEFAULT_ERROR_PAGE),
        }
    }
}

impl From<super::traits::StoreError> for AuthError {
    fn from(e: super::traits::StoreError) -> Self {
        Self::Store(e.to_string())
    }
}
