//! Backend-for-frontend login flow for Axum.
//!
//! The browser only ever holds an encrypted, opaque session cookie; tokens
//! stay in the [`SessionStore`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use oidc_sso::OidcClient;
//! use oidc_sso::middleware::{BffConfig, BffState, MemorySessionStore, bff_routes};
//!
//! let config = BffConfig::from_env()?;
//! let client = OidcClient::discover(config.oidc().clone()).await?;
//! let store = MemorySessionStore::new(config.idle_ttl());
//!
//! let state = BffState::new(config, client, store);
//! let app = axum::Router::new().merge(bff_routes(state.clone()));
//! ```

mod config;
mod cookies;
mod error;
mod extractor;
mod flow;
mod memory;
mod redirect;
mod routes;
mod state;
mod traits;
mod types;

pub use config::BffConfig;
pub use error::AuthError;
pub use extractor::{AuthenticatedSession, require_authenticated};
pub use flow::{AuthFlow, LoginRedirect};
pub use memory::{DEFAULT_IDLE_TTL, MemorySessionStore};
pub use routes::bff_routes;
pub use state::BffState;
pub use traits::{SessionStore, StoreError};
pub use types::{Session, SessionState};

/// Re-export cookie key type for builder API.
pub use axum_extra::extract::cookie::Key as CookieKey;
