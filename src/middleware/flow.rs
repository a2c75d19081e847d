//! Login, callback and logout as transitions over stored sessions.
//!
//! ```text
//! Anonymous --begin_login--> FlowPending --complete_callback--> Authenticated
//!     ^                          |                                  |
//!     +------- any failure ------+------------- logout -------------+
//! ```
//!
//! Every transition awaits the session write before returning, so the
//! redirect that follows never races an unflushed session.

use std::sync::Arc;

use url::Url;

use super::error::AuthError;
use super::traits::SessionStore;
use super::types::{Session, SessionState};
use crate::oauth::{CallbackParams, OidcClient};
use crate::types::SessionId;

/// Result of starting a login: the session to bind and where to send the browser.
#[derive(Debug)]
#[non_exhaustive]
pub struct LoginRedirect {
    pub session_id: SessionId,
    pub authorization_url: String,
}

/// Drives the authorization-code flow for one provider over a session store.
pub struct AuthFlow<S> {
    client: Arc<OidcClient>,
    store: Arc<S>,
}

// Manual Clone: avoid derive adding an `S: Clone` bound.
impl<S> Clone for AuthFlow<S> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            store: self.store.clone(),
        }
    }
}

impl<S: SessionStore> AuthFlow<S> {
    #[must_use]
    pub fn new(client: Arc<OidcClient>, store: Arc<S>) -> Self {
        Self { client, store }
    }

    #[must_use]
    pub fn client(&self) -> &OidcClient {
        &self.client
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// `Anonymous -> FlowPending`.
    ///
    /// Always binds a fresh session id; a previous session on this browser
    /// is discarded. The verifier and state are stored before the redirect
    /// target is handed back.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Store`] if the pending session cannot be persisted.
    pub async fn begin_login(
        &self,
        current: Option<&SessionId>,
    ) -> Result<LoginRedirect, AuthError> {
        if let Some(old) = current {
            if let Err(e) = self.store.destroy(old).await {
                tracing::warn!(error = %e, "Failed to discard previous session at login");
            }
        }

        let request = self.client.authorization_request();
        let session_id = SessionId::generate();
        self.store
            .set(Session::flow_pending(
                session_id.clone(),
                request.code_verifier,
                request.state,
            ))
            .await?;

        tracing::debug!("Login initiated");
        Ok(LoginRedirect {
            session_id,
            authorization_url: request.url,
        })
    }

    /// `FlowPending -> Authenticated`.
    ///
    /// The pending verifier is consumed before anything else happens, so a
    /// replayed or failed callback always lands back in `Anonymous`. On
    /// success the session is re-keyed and the new id returned.
    ///
    /// # Errors
    ///
    /// - [`AuthError::SessionLost`] when no login is pending on this session
    /// - [`AuthError::ProviderError`] when the provider reported an error
    /// - [`AuthError::StateMismatch`] when `state` differs from the one issued
    /// - [`AuthError::InvalidCallback`] when no code was supplied
    /// - [`AuthError::ExchangeFailed`] when the code is rejected or the ID
    ///   token is missing or fails verification
    /// - [`AuthError::UserInfoFailed`] when claims cannot be fetched or name a
    ///   different subject than the ID token
    /// - [`AuthError::UpstreamTimeout`] when a provider call times out
    pub async fn complete_callback(
        &self,
        current: Option<&SessionId>,
        params: CallbackParams,
    ) -> Result<SessionId, AuthError> {
        let Some(session_id) = current else {
            return Err(AuthError::SessionLost);
        };
        let Some(Session {
            state:
                SessionState::FlowPending {
                    code_verifier,
                    state: expected_state,
                },
            ..
        }) = self.store.get(session_id).await?
        else {
            return Err(AuthError::SessionLost);
        };

        // single use, whatever happens next
        self.store.destroy(session_id).await?;

        if let Some(error) = params.error {
            tracing::warn!(
                error = %error,
                description = params.error_description.as_deref().unwrap_or(""),
                "Identity provider returned an error"
            );
            return Err(AuthError::ProviderError {
                error,
                description: params.error_description,
            });
        }

        if params.state.as_deref() != Some(expected_state.as_str()) {
            return Err(AuthError::StateMismatch);
        }

        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::InvalidCallback("missing authorization code".into()))?;

        let tokens = self
            .client
            .exchange_code(&code, &code_verifier)
            .await
            .map_err(|e| AuthError::from_provider_call(e, AuthError::ExchangeFailed))?;

        let id_token = tokens
            .id_token
            .as_deref()
            .ok_or_else(|| AuthError::ExchangeFailed("token response has no id_token".into()))?;
        let id_claims = self
            .client
            .verify_id_token(id_token)
            .await
            .map_err(|e| AuthError::from_provider_call(e, AuthError::ExchangeFailed))?;

        let user_info = self
            .client
            .fetch_user_info(&tokens.access_token)
            .await
            .map_err(|e| AuthError::from_provider_call(e, AuthError::UserInfoFailed))?;
        if id_claims.subject() != Some(user_info.sub()) {
            return Err(AuthError::UserInfoFailed(
                "userinfo subject does not match the ID token".into(),
            ));
        }

        let new_id = SessionId::generate();
        let username = user_info.claims().display_name().unwrap_or_default().to_owned();
        self.store
            .set(Session::authenticated(new_id.clone(), tokens, user_info))
            .await?;

        tracing::info!(user = %username, "User authenticated");
        Ok(new_id)
    }

    /// `Authenticated -> Anonymous`.
    ///
    /// Returns the provider's end-session URL when the session held an id
    /// token and the provider supports RP-initiated logout; `None` means
    /// "go to the landing page". Store failures are logged, never raised.
    pub async fn logout(&self, current: Option<&SessionId>) -> Option<Url> {
        let session_id = current?;

        let id_token = match self.store.get(session_id).await {
            Ok(session) => session.and_then(|s| s.id_token().map(String::from)),
            Err(e) => {
                tracing::warn!(error = %e, "Session lookup failed during logout");
                None
            }
        };

        if let Err(e) = self.store.destroy(session_id).await {
            tracing::warn!(error = %e, "Session deletion failed during logout");
        }

        let url = id_token.and_then(|token| self.client.build_logout_url(&token));
        tracing::info!(provider_logout = url.is_some(), "User logged out");
        url
    }

    /// The authenticated session behind `current`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Store`] when the store cannot be read.
    pub async fn authenticated_session(
        &self,
        current: Option<&SessionId>,
    ) -> Result<Option<Session>, AuthError> {
        let Some(session_id) = current else {
            return Ok(None);
        };
        Ok(self
            .store
            .get(session_id)
            .await?
            .filter(Session::is_authenticated))
    }
}
