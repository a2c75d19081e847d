use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router, middleware};
use serde_json::{Value as JsonValue, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::gate::{ResourceState, optional_bearer, require_bearer};
use crate::token::VerifiedClaims;

/// Create the resource server router.
///
/// - `GET /api/profile` and `GET /api/profile/details` require a bearer token
/// - `GET /api/public` accepts one optionally
pub fn resource_routes(state: ResourceState) -> Router {
    let protected = Router::new()
        .route("/api/profile", get(profile))
        .route("/api/profile/details", get(profile_details))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    let public = Router::new()
        .route("/api/public", get(public))
        .route_layer(middleware::from_fn_with_state(state.clone(), optional_bearer));

    Router::new().merge(protected).merge(public).with_state(state)
}

async fn profile(State(state): State<ResourceState>, claims: VerifiedClaims) -> Json<JsonValue> {
    let roles = state
        .roles_claim
        .as_deref()
        .map(|path| claims.claims().roles(path))
        .unwrap_or_default();

    tracing::info!(
        user = claims.claims().display_name().unwrap_or_default(),
        "Protected profile accessed"
    );

    Json(json!({
        "message": "Access granted",
        "user": claims.claims().display_name(),
        "email": claims.claims().email(),
        "roles": roles,
        "claims": claims,
        "timestamp": now_rfc3339(),
    }))
}

async fn profile_details(claims: VerifiedClaims) -> Json<JsonValue> {
    let standard = [
        "sub",
        "name",
        "preferred_username",
        "given_name",
        "family_name",
        "email",
        "email_verified",
        "realm_access",
        "resource_access",
    ];
    let mut body = serde_json::Map::new();
    for key in standard {
        body.insert(
            key.to_owned(),
            claims.get_claim(key).cloned().unwrap_or(JsonValue::Null),
        );
    }
    body.insert(
        "token_info".to_owned(),
        json!({
            "issuer": claims.issuer(),
            "audience": claims.audience(),
            "issued_at": claims.issued_at().and_then(|t| t.format(&Rfc3339).ok()),
            "expires_at": claims.expires_at().and_then(|t| t.format(&Rfc3339).ok()),
        }),
    );
    Json(JsonValue::Object(body))
}

async fn public(claims: Option<VerifiedClaims>) -> Json<JsonValue> {
    Json(json!({
        "message": "Public endpoint",
        "authenticated": claims.is_some(),
        "timestamp": now_rfc3339(),
    }))
}

fn now_rfc3339() -> Option<String> {
    OffsetDateTime::now_utc().format(&Rfc3339).ok()
}
