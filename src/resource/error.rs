use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use super::config::Environment;
use crate::token::ValidationError;

/// Why a request was refused by the bearer gate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum BearerError {
    #[error("Authorization header missing")]
    MissingAuthHeader,
    #[error("Invalid authorization format. Expected: Bearer <token>")]
    InvalidAuthFormat,
    #[error("Access token is empty")]
    EmptyToken,
    #[error(transparent)]
    Token(#[from] ValidationError),
}

impl BearerError {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingAuthHeader => "MISSING_AUTH_HEADER",
            Self::InvalidAuthFormat => "INVALID_AUTH_FORMAT",
            Self::EmptyToken => "EMPTY_TOKEN",
            Self::Token(e) => e.code(),
        }
    }

    /// Human-readable message for development builds.
    fn detailed_message(&self) -> String {
        match self {
            Self::Token(ValidationError::Expired) => "Token has expired".into(),
            Self::Token(ValidationError::InvalidClaims(detail)) => {
                format!("Token validation failed: invalid claims ({detail})")
            }
            Self::Token(ValidationError::InvalidSignature(detail)) => {
                format!("Invalid token signature ({detail})")
            }
            Self::Token(ValidationError::InvalidToken(detail)) => {
                format!("Invalid or expired token ({detail})")
            }
            other => other.to_string(),
        }
    }

    /// 401 with `{error, code}`. Production bodies keep the code but drop
    /// the detail so the endpoint is not a validation oracle.
    #[must_use]
    pub fn to_response(&self, environment: Environment) -> Response {
        let message = if environment.is_production() {
            "Unauthorized".to_string()
        } else {
            self.detailed_message()
        };
        (
            StatusCode::UNAUTHORIZED,
            [(axum::http::header::WWW_AUTHENTICATE, "Bearer")],
            Json(json!({ "error": message, "code": self.code() })),
        )
            .into_response()
    }
}

impl IntoResponse for BearerError {
    fn into_response(self) -> Response {
        self.to_response(Environment::Production)
    }
}
