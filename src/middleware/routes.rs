use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router, middleware};
use axum_extra::extract::PrivateCookieJar;
use serde_json::{Value as JsonValue, json};

use super::cookies;
use super::extractor::{AuthenticatedSession, require_authenticated};
use super::redirect::found;
use super::state::BffState;
use super::traits::SessionStore;
use crate::oauth::CallbackParams;

/// Create the BFF authentication router.
///
/// - `GET /login` starts the flow and redirects to the provider
/// - `GET /callback` completes it and redirects to the landing page
/// - `GET|POST /logout` ends the session and redirects to the provider's
///   end-session endpoint (or the landing page)
/// - `GET /me` returns the session's user claims, behind the session guard
pub fn bff_routes<S: SessionStore>(state: BffState<S>) -> Router {
    let guarded = Router::new()
        .route("/me", get(me))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_authenticated::<S>,
        ));

    Router::new()
        .route("/login", get(login::<S>))
        .route("/callback", get(callback::<S>))
        .route("/logout", get(logout::<S>).post(logout::<S>))
        .merge(guarded)
        .with_state(state)
}

// ── Login ──────────────────────────────────────────────────────────

async fn login<S: SessionStore>(
    State(state): State<BffState<S>>,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Response), Response> {
    let current = cookies::session_id(&jar, &state.settings.cookie_name);

    let redirect = state
        .flow
        .begin_login(current.as_ref())
        .await
        .map_err(IntoResponse::into_response)?;

    let cookie = cookies::session_cookie(
        &state.settings.cookie_name,
        &redirect.session_id,
        state.settings.idle_ttl,
        state.settings.secure_cookies,
    );

    Ok((jar.add(cookie), found(&redirect.authorization_url)))
}

// ── Callback ───────────────────────────────────────────────────────

async fn callback<S: SessionStore>(
    State(state): State<BffState<S>>,
    jar: PrivateCookieJar,
    Query(params): Query<CallbackParams>,
) -> (PrivateCookieJar, Response) {
    let current = cookies::session_id(&jar, &state.settings.cookie_name);

    match state.flow.complete_callback(current.as_ref(), params).await {
        Ok(session_id) => {
            let cookie = cookies::session_cookie(
                &state.settings.cookie_name,
                &session_id,
                state.settings.idle_ttl,
                state.settings.secure_cookies,
            );
            (
                jar.add(cookie),
                found(&state.settings.landing_path),
            )
        }
        Err(e) if e.is_flow_error() => {
            tracing::warn!(code = e.code(), error = %e, "Login callback failed");
            let clear = cookies::clear_session_cookie(&state.settings.cookie_name);
            (
                jar.remove(clear),
                e.error_page_redirect(&state.settings.error_page),
            )
        }
        Err(e) => (jar, e.into_response()),
    }
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout<S: SessionStore>(
    State(state): State<BffState<S>>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Response) {
    let current = cookies::session_id(&jar, &state.settings.cookie_name);

    let target = state
        .flow
        .logout(current.as_ref())
        .await
        .map_or_else(|| state.settings.landing_path.clone(), String::from);

    let clear_cookie = cookies::clear_session_cookie(&state.settings.cookie_name);
    (jar.remove(clear_cookie), found(&target))
}

// ── Session info ───────────────────────────────────────────────────

async fn me(session: AuthenticatedSession) -> Json<JsonValue> {
    Json(json!({
        "authenticated": true,
        "user": session.user_info,
        "expires_at": session
            .tokens
            .expires_at
            .and_then(|at| at.format(&time::format_description::well_known::Rfc3339).ok()),
    }))
}
