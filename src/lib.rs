#![doc = include_str!("../README.md")]

pub mod claims;
pub mod error;
#[cfg(feature = "token")]
pub mod jwks;
#[cfg(feature = "axum")]
pub mod middleware;
#[cfg(feature = "oauth")]
pub mod oauth;
#[cfg(feature = "oauth")]
pub mod pkce;
#[cfg(feature = "axum")]
pub mod resource;
#[cfg(feature = "token")]
pub mod token;
pub mod types;
pub mod well_known;

// Re-exports for convenient access
pub use claims::ClaimSet;
pub use error::Error;
#[cfg(feature = "token")]
pub use jwks::{Jwk, Jwks, KeyRing};
#[cfg(feature = "oauth")]
pub use oauth::{
    AuthorizationRequest, CallbackParams, OidcClient, OidcConfig, TokenResponse, TokenSet,
    UserInfo,
};
#[cfg(feature = "oauth")]
pub use pkce::{PkcePair, generate_code_challenge, generate_code_verifier, generate_state};
#[cfg(feature = "token")]
pub use token::{TokenValidator, ValidationError, ValidationResult, VerifiedClaims};
pub use types::{KeyId, SessionId};
pub use well_known::ProviderMetadata;
