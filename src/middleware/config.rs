use std::time::Duration;

use axum_extra::extract::cookie::Key;
use url::Url;

use super::error::{AuthError, DEFAULT_ERROR_PAGE};
use super::memory::DEFAULT_IDLE_TTL;
use crate::oauth::OidcConfig;
use crate::resource::Environment;

pub(crate) const DEFAULT_COOKIE_NAME: &str = "sso.sid";
pub(crate) const LOGIN_PATH: &str = "/login";

/// Session and routing settings shared by config and runtime state.
#[derive(Clone)]
pub(crate) struct SessionSettings {
    pub(crate) cookie_key: Key,
    pub(crate) cookie_name: String,
    pub(crate) idle_ttl: Duration,
    pub(crate) secure_cookies: bool,
    pub(crate) landing_path: String,
    pub(crate) error_page: String,
}

impl SessionSettings {
    fn defaults() -> Self {
        Self {
            cookie_key: Key::generate(),
            cookie_name: DEFAULT_COOKIE_NAME.into(),
            idle_ttl: DEFAULT_IDLE_TTL,
            secure_cookies: true,
            landing_path: "/".into(),
            error_page: DEFAULT_ERROR_PAGE.into(),
        }
    }
}

/// BFF configuration.
///
/// The relying-party settings are a constructor parameter; everything else
/// has a default that can be overridden with `with_*` methods.
///
/// Use [`from_env()`](BffConfig::from_env) for convention-based setup.
pub struct BffConfig {
    pub(super) oidc: OidcConfig,
    pub(super) settings: SessionSettings,
}

impl BffConfig {
    #[must_use]
    pub fn new(oidc: OidcConfig) -> Self {
        Self {
            oidc,
            settings: SessionSettings::defaults(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `ISSUER`: identity provider issuer URL
    /// - `CLIENT_ID`, `CLIENT_SECRET`: confidential client credentials
    ///
    /// # Optional env vars
    /// - `REDIRECT_URI`: callback URL (default `http://localhost:3000/callback`)
    /// - `POST_LOGOUT_REDIRECT_URI`: where the provider sends the browser after logout
    ///   (default `http://localhost:3000`)
    /// - `SCOPES`: comma-separated scopes (default `openid,profile,email`)
    /// - `HTTP_TIMEOUT_MS`: per-call timeout for provider requests (default 5000)
    /// - `SESSION_SECRET`: cookie encryption key, at least 64 bytes
    /// - `SESSION_IDLE_TTL_SECS`: idle session lifetime (default 86400)
    /// - `APP_ENV`: `production` (any case) marks the session cookie `Secure`
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if required env vars are missing or values are invalid.
    pub fn from_env() -> Result<Self, AuthError> {
        let issuer = parse_url("ISSUER", &required("ISSUER")?)?;
        let client_id = required("CLIENT_ID")?;
        let client_secret = required("CLIENT_SECRET")?;
        let redirect_uri = parse_url(
            "REDIRECT_URI",
            &optional("REDIRECT_URI").unwrap_or_else(|| "http://localhost:3000/callback".into()),
        )?;
        let post_logout = parse_url(
            "POST_LOGOUT_REDIRECT_URI",
            &optional("POST_LOGOUT_REDIRECT_URI")
                .unwrap_or_else(|| "http://localhost:3000".into()),
        )?;

        let mut oidc = OidcConfig::new(issuer, client_id, client_secret, redirect_uri)
            .with_post_logout_redirect_uri(post_logout);

        if let Some(scopes) = optional("SCOPES") {
            oidc = oidc.with_scopes(
                scopes
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            );
        }
        if let Some(ms) = optional("HTTP_TIMEOUT_MS") {
            oidc = oidc.with_timeout(Duration::from_millis(parse_number("HTTP_TIMEOUT_MS", &ms)?));
        }

        let production = secure_cookies_for(optional("APP_ENV").as_deref());

        let cookie_key = match optional("SESSION_SECRET") {
            Some(secret) => Key::try_from(secret.as_bytes()).map_err(|_| {
                AuthError::Config(
                    "SESSION_SECRET is set but invalid (must be at least 64 bytes). \
                     Remove the env var to use an ephemeral key, or provide a valid key."
                        .into(),
                )
            })?,
            None => {
                tracing::warn!("SESSION_SECRET not set; sessions will not survive a restart");
                Key::generate()
            }
        };

        let mut config = Self::new(oidc)
            .with_cookie_key(cookie_key)
            .with_secure_cookies(production);

        if let Some(secs) = optional("SESSION_IDLE_TTL_SECS") {
            config = config.with_idle_ttl(Duration::from_secs(parse_number(
                "SESSION_IDLE_TTL_SECS",
                &secs,
            )?));
        }

        Ok(config)
    }

    #[must_use]
    pub fn oidc(&self) -> &OidcConfig {
        &self.oidc
    }

    #[must_use]
    pub fn idle_ttl(&self) -> Duration {
        self.settings.idle_ttl
    }

    #[must_use]
    pub fn with_cookie_key(mut self, key: Key) -> Self {
        self.settings.cookie_key = key;
        self
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.settings.idle_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn with_landing_path(mut self, path: impl Into<String>) -> Self {
        self.settings.landing_path = path.into();
        self
    }

    #[must_use]
    pub fn with_error_page(mut self, path: impl Into<String>) -> Self {
        self.settings.error_page = path.into();
        self
    }
}

/// Session cookies are `Secure` only when `APP_ENV` names production.
fn secure_cookies_for(app_env: Option<&str>) -> bool {
    Environment::from_app_env(app_env).is_production()
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &str) -> Result<String, AuthError> {
    optional(name).ok_or_else(|| AuthError::Config(format!("{name} is required")))
}

fn parse_url(name: &str, value: &str) -> Result<Url, AuthError> {
    value
        .parse()
        .map_err(|e| AuthError::Config(format!("{name}: {e}")))
}

fn parse_number(name: &str, value: &str) -> Result<u64, AuthError> {
    value
        .trim()
        .parse()
        .map_err(|e| AuthError::Config(format!("{name}: {e}")))
}
