use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::ACCEPT;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::PrivateCookieJar;

use super::config::LOGIN_PATH;
use super::cookies;
use super::error::AuthError;
use super::redirect::found;
use super::state::BffState;
use super::traits::SessionStore;
use super::types::{Session, SessionState};
use crate::oauth::{TokenSet, UserInfo};
use crate::types::SessionId;

/// Authenticated session attached to the request by [`require_authenticated`].
///
/// Use as an Axum extractor in guarded handlers; the access token is
/// available for calls to downstream resource servers.
///
/// # Example
///
/// ```rust,ignore
/// async fn dashboard(session: AuthenticatedSession) -> impl IntoResponse {
///     format!("Hello, {}", session.user_info.claims().display_name().unwrap_or("?"))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub session_id: SessionId,
    pub tokens: TokenSet,
    pub user_info: UserInfo,
}

impl<St: Send + Sync> FromRequestParts<St> for AuthenticatedSession {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(AuthError::Unauthenticated)
    }
}

/// Route guard: passes authenticated sessions through, turns everyone else away.
///
/// Requests that expect a structured response get a 401 JSON body;
/// page navigations are redirected to `/login`. Token expiry is not checked
/// here; the resource server enforces it.
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/dashboard", get(dashboard))
///     .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_authenticated::<S>));
/// ```
pub async fn require_authenticated<S: SessionStore>(
    State(state): State<BffState<S>>,
    jar: PrivateCookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let session_id = cookies::session_id(&jar, &state.settings.cookie_name);
    let session = match state
        .flow
        .authenticated_session(session_id.as_ref())
        .await
    {
        Ok(session) => session,
        Err(e) => return e.into_response(),
    };

    if let Some(Session {
        id,
        state: SessionState::Authenticated { tokens, user_info },
    }) = session
    {
        request.extensions_mut().insert(AuthenticatedSession {
            session_id: id,
            tokens,
            user_info,
        });
        return next.run(request).await;
    }

    tracing::debug!(path = %request.uri().path(), "Unauthenticated request to guarded route");
    if expects_structured_response(&request) {
        AuthError::Unauthenticated.into_response()
    } else {
        found(LOGIN_PATH)
    }
}

/// XHR, JSON-accepting and `/api` requests want a status code, not a page.
fn expects_structured_response(request: &Request) -> bool {
    let headers = request.headers();
    let xhr = headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));
    let wants_json = headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));
    xhr || wants_json || request.uri().path().starts_with("/api")
}
