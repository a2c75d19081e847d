use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{FromRequestParts, OptionalFromRequestParts, Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;

use super::config::{Environment, ResourceConfig};
use super::error::BearerError;
use crate::error::Error;
use crate::token::{TokenValidator, VerifiedClaims};

/// Shared state for the bearer gate and the resource routes.
#[derive(Clone)]
pub struct ResourceState {
    pub(super) validator: Arc<TokenValidator>,
    pub(super) environment: Environment,
    pub(super) roles_claim: Option<String>,
}

impl ResourceState {
    #[must_use]
    pub fn new(validator: TokenValidator, environment: Environment) -> Self {
        Self {
            validator: Arc::new(validator),
            environment,
            roles_claim: None,
        }
    }

    /// Builds the key ring and validator described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a symmetric algorithm.
    pub fn from_config(config: &ResourceConfig) -> Result<Self, Error> {
        let validator = config.validator(Arc::new(config.key_ring()))?;
        Ok(Self::new(validator, config.environment).with_roles_claim(config.roles_claim.clone()))
    }

    #[must_use]
    pub fn with_roles_claim(mut self, path: Option<String>) -> Self {
        self.roles_claim = path;
        self
    }

    #[must_use]
    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Result<&str, BearerError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(BearerError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| BearerError::InvalidAuthFormat)?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or(BearerError::InvalidAuthFormat)?;
    if token.trim().is_empty() {
        return Err(BearerError::EmptyToken);
    }
    Ok(token)
}

async fn authenticate(state: &ResourceState, headers: &HeaderMap) -> Result<VerifiedClaims, BearerError> {
    let token = bearer_token(headers)?;
    Ok(state.validator.verify(token).await?)
}

/// Gate for protected routes: attaches [`VerifiedClaims`] or answers 401.
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/api/orders", get(orders))
///     .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_bearer));
/// ```
pub async fn require_bearer(
    State(state): State<ResourceState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&state, request.headers()).await {
        Ok(claims) => {
            tracing::debug!(
                sub = claims.subject().unwrap_or_default(),
                path = %request.uri().path(),
                "Bearer token accepted"
            );
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            tracing::warn!(
                code = e.code(),
                reason = %e,
                path = %request.uri().path(),
                "Bearer token rejected"
            );
            e.to_response(state.environment)
        }
    }
}

/// Optional-auth gate: attaches claims when a valid token is present and
/// otherwise proceeds anonymously, without surfacing why.
pub async fn optional_bearer(
    State(state): State<ResourceState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&state, request.headers()).await {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
        }
        Err(BearerError::MissingAuthHeader) => {}
        Err(e) => {
            tracing::debug!(code = e.code(), "Ignoring invalid bearer token on optional route");
        }
    }
    next.run(request).await
}

impl<S: Send + Sync> FromRequestParts<S> for VerifiedClaims {
    type Rejection = BearerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(BearerError::MissingAuthHeader)
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for VerifiedClaims {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned())
    }
}
