use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use super::config::{BffConfig, SessionSettings};
use super::flow::AuthFlow;
use super::traits::SessionStore;
use crate::oauth::OidcClient;

/// Shared state for the BFF routes and the session guard.
///
/// Clone it into [`require_authenticated`](super::require_authenticated) to
/// guard application routes with the same sessions the login flow creates.
pub struct BffState<S> {
    pub(super) flow: AuthFlow<S>,
    pub(super) settings: SessionSettings,
}

// Manual Clone: avoid derive adding an `S: Clone` bound.
impl<S> Clone for BffState<S> {
    fn clone(&self) -> Self {
        Self {
            flow: self.flow.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<S: SessionStore> BffState<S> {
    /// `client` must be discovered against `config.oidc()`.
    #[must_use]
    pub fn new(config: BffConfig, client: OidcClient, store: S) -> Self {
        Self {
            flow: AuthFlow::new(Arc::new(client), Arc::new(store)),
            settings: config.settings,
        }
    }

    #[must_use]
    pub fn flow(&self) -> &AuthFlow<S> {
        &self.flow
    }
}

// PrivateCookieJar requires Key to be extractable from state
impl<S: SessionStore> FromRef<BffState<S>> for Key {
    fn from_ref(state: &BffState<S>) -> Self {
        state.settings.cookie_key.clone()
    }
}
