use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use url::Url;

use crate::error::Error;
use crate::jwks::{DEFAULT_COOLDOWN, DEFAULT_MAX_AGE, KeyRing};
use crate::token::TokenValidator;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Deployment mode; decides how much detail 401 bodies carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// `production` (any case) is production; anything else is development.
    #[must_use]
    pub fn from_app_env(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("production") => Self::Production,
            _ => Self::Development,
        }
    }

    #[must_use]
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

/// Resource server token-validation settings.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ResourceConfig {
    pub issuer: String,
    pub jwks_uri: Url,
    pub audience: Option<String>,
    pub algorithm: Algorithm,
    pub clock_skew_secs: u64,
    pub jwks_max_age: Duration,
    pub jwks_cooldown: Duration,
    pub http_timeout: Duration,
    /// Dotted claim path holding the caller's roles, e.g. `realm_access.roles`.
    pub roles_claim: Option<String>,
    pub environment: Environment,
}

impl ResourceConfig {
    #[must_use]
    pub fn new(issuer: impl Into<String>, jwks_uri: Url) -> Self {
        Self {
            issuer: issuer.into(),
            jwks_uri,
            audience: None,
            algorithm: Algorithm::RS256,
            clock_skew_secs: 0,
            jwks_max_age: DEFAULT_MAX_AGE,
            jwks_cooldown: DEFAULT_COOLDOWN,
            http_timeout: DEFAULT_TIMEOUT,
            roles_claim: None,
            environment: Environment::Development,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `ISSUER`: expected `iss` of every token
    /// - `JWKS_URI`: the provider's published key set
    ///
    /// # Optional env vars
    /// - `JWT_AUDIENCE`: required `aud` value
    /// - `JWT_ALGORITHM`: the single accepted signing algorithm (default `RS256`)
    /// - `CLOCK_SKEW_SECS` (default 0), `JWKS_MAX_AGE_SECS` (default 600),
    ///   `JWKS_COOLDOWN_SECS` (default 30), `HTTP_TIMEOUT_MS` (default 5000)
    /// - `ROLES_CLAIM`: dotted path of the roles claim
    /// - `APP_ENV`: `production` hides validation details from 401 bodies
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required env vars are missing or values are invalid.
    pub fn from_env() -> Result<Self, Error> {
        let issuer = required("ISSUER")?;
        let jwks_uri = required("JWKS_URI")?
            .parse()
            .map_err(|e| Error::Config(format!("JWKS_URI: {e}")))?;

        let mut config = Self::new(issuer, jwks_uri);
        config.audience = optional("JWT_AUDIENCE");
        config.roles_claim = optional("ROLES_CLAIM");
        config.environment = Environment::from_app_env(optional("APP_ENV").as_deref());

        if let Some(alg) = optional("JWT_ALGORITHM") {
            config.algorithm = parse_algorithm(&alg)?;
        }
        if let Some(v) = optional("CLOCK_SKEW_SECS") {
            config.clock_skew_secs = parse_number("CLOCK_SKEW_SECS", &v)?;
        }
        if let Some(v) = optional("JWKS_MAX_AGE_SECS") {
            config.jwks_max_age = Duration::from_secs(parse_number("JWKS_MAX_AGE_SECS", &v)?);
        }
        if let Some(v) = optional("JWKS_COOLDOWN_SECS") {
            config.jwks_cooldown = Duration::from_secs(parse_number("JWKS_COOLDOWN_SECS", &v)?);
        }
        if let Some(v) = optional("HTTP_TIMEOUT_MS") {
            config.http_timeout = Duration::from_millis(parse_number("HTTP_TIMEOUT_MS", &v)?);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    #[must_use]
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    #[must_use]
    pub fn with_roles_claim(mut self, path: impl Into<String>) -> Self {
        self.roles_claim = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn with_jwks_cooldown(mut self, cooldown: Duration) -> Self {
        self.jwks_cooldown = cooldown;
        self
    }

    /// Key ring for `jwks_uri` with this config's freshness rules.
    #[must_use]
    pub fn key_ring(&self) -> KeyRing {
        KeyRing::new(self.jwks_uri.clone(), self.algorithm)
            .with_timeout(self.http_timeout)
            .with_max_age(self.jwks_max_age)
            .with_cooldown(self.jwks_cooldown)
    }

    /// Validator over the given key ring.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a symmetric algorithm.
    pub fn validator(&self, key_ring: Arc<KeyRing>) -> Result<TokenValidator, Error> {
        Ok(TokenValidator::new(key_ring, self.issuer.clone())?
            .with_audience(self.audience.clone())
            .with_leeway(self.clock_skew_secs))
    }
}

/// Parse an asymmetric JWS algorithm name.
fn parse_algorithm(alg: &str) -> Result<Algorithm, Error> {
    match alg.trim().to_ascii_uppercase().as_str() {
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        "PS256" => Ok(Algorithm::PS256),
        "PS384" => Ok(Algorithm::PS384),
        "PS512" => Ok(Algorithm::PS512),
        "ES256" => Ok(Algorithm::ES256),
        "ES384" => Ok(Algorithm::ES384),
        "EDDSA" => Ok(Algorithm::EdDSA),
        other => Err(Error::Config(format!(
            "JWT_ALGORITHM: unsupported algorithm '{other}'"
        ))),
    }
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &str) -> Result<String, Error> {
    optional(name).ok_or_else(|| Error::Config(format!("{name} is required")))
}

fn parse_number(name: &str, value: &str) -> Result<u64, Error> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{name}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_algorithm() {
        assert_eq!(parse_algorithm("RS256").unwrap(), Algorithm::RS256);
        assert_eq!(parse_algorithm(" es256 ").unwrap(), Algorithm::ES256);
        assert_eq!(parse_algorithm("EdDSA").unwrap(), Algorithm::EdDSA);
        assert!(parse_algorithm("HS256").is_err());
        assert!(parse_algorithm("none").is_err());
    }

    #[test]
    fn test_environment_from_app_env() {
        assert_eq!(
            Environment::from_app_env(Some("production")),
            Environment::Production
        );
        assert_eq!(
            Environment::from_app_env(Some("PRODUCTION")),
            Environment::Production
        );
        assert_eq!(
            Environment::from_app_env(Some("staging")),
            Environment::Development
        );
        assert_eq!(Environment::from_app_env(None), Environment::Development);
    }

    #[test]
    fn test_defaults() {
        let config = ResourceConfig::new(
            "https://idp.example.com",
            "https://idp.example.com/certs".parse().unwrap(),
        );
        assert_eq!(config.algorithm, Algorithm::RS256);
        assert_eq!(config.clock_skew_secs, 0);
        assert_eq!(config.jwks_max_age, Duration::from_secs(600));
        assert_eq!(config.jwks_cooldown, Duration::from_secs(30));
        assert!(config.audience.is_none());
        assert_eq!(config.key_ring().algorithm(), Algorithm::RS256);
    }
}
