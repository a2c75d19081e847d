use serde::{Deserialize, Serialize};
use url::Url;

/// Path of the OIDC discovery document, relative to the issuer.
pub const OPENID_CONFIGURATION_PATH: &str = ".well-known/openid-configuration";

/// Subset of the OpenID Provider Metadata consumed by the BFF.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    #[serde(default)]
    pub userinfo_endpoint: Option<Url>,
    pub jwks_uri: Url,
    #[serde(default)]
    pub end_session_endpoint: Option<Url>,
    #[serde(default)]
    pub code_challenge_methods_supported: Option<Vec<String>>,
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Option<Vec<String>>,
}

impl ProviderMetadata {
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        authorization_endpoint: Url,
        token_endpoint: Url,
        jwks_uri: Url,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            authorization_endpoint,
            token_endpoint,
            userinfo_endpoint: None,
            jwks_uri,
            end_session_endpoint: None,
            code_challenge_methods_supported: None,
            id_token_signing_alg_values_supported: None,
        }
    }

    #[must_use]
    pub fn with_userinfo_endpoint(mut self, url: Url) -> Self {
        self.userinfo_endpoint = Some(url);
        self
    }

    #[must_use]
    pub fn with_end_session_endpoint(mut self, url: Url) -> Self {
        self.end_session_endpoint = Some(url);
        self
    }

    /// Discovery URL for an issuer: `{issuer}/.well-known/openid-configuration`.
    #[must_use]
    pub fn discovery_url(issuer: &Url) -> Url {
        let mut base = issuer.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        // Joining a relative path onto a directory URL cannot fail.
        base.join(OPENID_CONFIGURATION_PATH).unwrap_or(base)
    }

    /// Whether this document was issued by `expected` (trailing slash insensitive).
    #[must_use]
    pub fn issued_by(&self, expected: &str) -> bool {
        self.issuer.trim_end_matches('/') == expected.trim_end_matches('/')
    }

    /// Whether the provider advertises S256 (absent list means "not stated").
    #[must_use]
    pub fn supports_s256(&self) -> bool {
        self.code_challenge_methods_supported
            .as_ref()
            .is_none_or(|methods| methods.iter().any(|m| m == "S256"))
    }
}
