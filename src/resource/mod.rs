//! Bearer-token gate and routes for the resource server.
//!
//! ```rust,ignore
//! use oidc_sso::resource::{ResourceConfig, ResourceState, resource_routes};
//!
//! let config = ResourceConfig::from_env()?;
//! let app = resource_routes(ResourceState::from_config(&config)?);
//! ```

mod config;
mod error;
mod gate;
mod routes;

pub use config::{Environment, ResourceConfig};
pub use error::BearerError;
pub use gate::{ResourceState, optional_bearer, require_bearer};
pub use routes::resource_routes;
