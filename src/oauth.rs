#[cfg(feature = "token")]
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "token")]
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use crate::claims::ClaimSet;
use crate::error::Error;
#[cfg(feature = "token")]
use crate::jwks::KeyRing;
use crate::pkce::{self, PkcePair};
#[cfg(feature = "token")]
use crate::token::{TokenValidator, VerifiedClaims};
use crate::well_known::ProviderMetadata;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Relying-party configuration for the single identity provider.
///
/// Required fields are constructor parameters; optional ones have defaults
/// that can be overridden by chaining.
///
/// ```rust,ignore
/// use oidc_sso::OidcConfig;
///
/// let config = OidcConfig::new(
///     "https://idp.example.com/realms/demo".parse()?,
///     "web-bff",
///     "s3cret",
///     "http://localhost:3000/callback".parse()?,
/// )
/// .with_scopes(vec!["openid".into(), "profile".into()]);
/// ```
#[derive(Clone)]
#[non_exhaustive]
pub struct OidcConfig {
    pub(crate) issuer: Url,
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) redirect_uri: Url,
    pub(crate) post_logout_redirect_uri: Option<Url>,
    pub(crate) scopes: Vec<String>,
    pub(crate) timeout: Duration,
}

impl OidcConfig {
    #[must_use]
    pub fn new(
        issuer: Url,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: Url,
    ) -> Self {
        Self {
            issuer,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri,
            post_logout_redirect_uri: None,
            scopes: vec!["openid".into(), "profile".into(), "email".into()],
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Where the provider sends the browser after RP-initiated logout.
    #[must_use]
    pub fn with_post_logout_redirect_uri(mut self, url: Url) -> Self {
        self.post_logout_redirect_uri = Some(url);
        self
    }

    /// Override the scopes (default: `["openid", "profile", "email"]`).
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Deadline applied to every call made to the provider.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &Url {
        &self.issuer
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn post_logout_redirect_uri(&self) -> Option<&Url> {
        self.post_logout_redirect_uri.as_ref()
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for OidcConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcConfig")
            .field("issuer", &self.issuer.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("scopes", &self.scopes)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// OpenID Connect client bound to one discovered provider.
pub struct OidcClient {
    config: OidcConfig,
    metadata: ProviderMetadata,
    http: reqwest::Client,
    #[cfg(feature = "token")]
    id_token_keys: Arc<KeyRing>,
}

impl std::fmt::Debug for OidcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcClient")
            .field("config", &self.config)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Everything the login step must persist before redirecting.
#[non_exhaustive]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub code_verifier: String,
}

/// Query parameters the provider appends to the redirect URI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Raw token endpoint response.
#[derive(Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Tokens held by an authenticated session.
///
/// Lives only inside the session store. `Debug` never prints token material.
#[derive(Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct TokenSet {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

impl TokenSet {
    #[must_use]
    pub fn new(access_token: impl Into<String>, id_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            id_token,
            refresh_token: None,
            expires_at: None,
        }
    }

    #[must_use]
    pub fn with_expires_at(mut self, at: OffsetDateTime) -> Self {
        self.expires_at = Some(at);
        self
    }

    fn from_response(response: TokenResponse, received_at: OffsetDateTime) -> Self {
        let expires_at = response
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| received_at + time::Duration::seconds(secs));
        Self {
            access_token: response.access_token,
            id_token: response.id_token,
            refresh_token: response.refresh_token,
            expires_at,
        }
    }

    /// Whether the access token's advertised lifetime has elapsed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| at <= OffsetDateTime::now_utc())
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[redacted]")
            .field("id_token", &self.id_token.as_ref().map(|_| "[redacted]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Claims returned by the provider's userinfo endpoint.
///
/// Kept as a generic claim map; `sub` is guaranteed present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserInfo(ClaimSet);

impl UserInfo {
    /// Wraps a claim set, rejecting one without a string `sub`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OAuth`] when `sub` is missing.
    pub fn try_from_claims(claims: ClaimSet) -> Result<Self, Error> {
        if claims.subject().is_none() {
            return Err(Error::OAuth {
                operation: "userinfo request",
                status: None,
                detail: "response has no `sub` claim".into(),
            });
        }
        Ok(Self(claims))
    }

    #[must_use]
    pub fn sub(&self) -> &str {
        self.0.subject().unwrap_or_default()
    }

    #[must_use]
    pub fn claims(&self) -> &ClaimSet {
        &self.0
    }
}

impl OidcClient {
    /// Fetches the provider's discovery document and binds a client to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`] when the document cannot be fetched, is
    /// malformed, names a different issuer, or does not allow S256 PKCE.
    pub async fn discover(config: OidcConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {e}")))?;
        Self::discover_with(config, http).await
    }

    /// Same as [`discover`](Self::discover) with a caller-provided HTTP client.
    ///
    /// # Errors
    ///
    /// See [`discover`](Self::discover).
    pub async fn discover_with(config: OidcConfig, http: reqwest::Client) -> Result<Self, Error> {
        let url = ProviderMetadata::discovery_url(&config.issuer);
        tracing::debug!(url = %url, "Fetching OIDC discovery document");

        let response = http
            .get(url)
            .timeout(config.timeout)
            .send()
            .await
            .map_err(|e| Error::Discovery(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Discovery(format!(
                "discovery endpoint returned status {}",
                response.status()
            )));
        }
        let metadata: ProviderMetadata = response
            .json()
            .await
            .map_err(|e| Error::Discovery(format!("invalid discovery document: {e}")))?;

        if !metadata.issued_by(config.issuer.as_str()) {
            return Err(Error::Discovery(format!(
                "issuer mismatch: configured '{}', discovered '{}'",
                config.issuer, metadata.issuer
            )));
        }
        if !metadata.supports_s256() {
            return Err(Error::Discovery(
                "provider does not support S256 code challenges".into(),
            ));
        }

        tracing::info!(issuer = %metadata.issuer, "Discovered OIDC provider");
        Ok(Self::new(config, metadata).with_http_client(http))
    }

    /// Builds a client from already-known provider metadata.
    #[must_use]
    pub fn new(config: OidcConfig, metadata: ProviderMetadata) -> Self {
        let http = reqwest::Client::new();
        Self {
            #[cfg(feature = "token")]
            id_token_keys: Arc::new(id_token_key_ring(&config, &metadata, &http)),
            config,
            metadata,
            http,
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        #[cfg(feature = "token")]
        {
            self.id_token_keys = Arc::new(id_token_key_ring(&self.config, &self.metadata, &client));
        }
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    #[must_use]
    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    /// Starts a login attempt: fresh PKCE pair and state, plus the authorize URL.
    #[must_use]
    pub fn authorization_request(&self) -> AuthorizationRequest {
        let pair = PkcePair::generate();
        let state = pkce::generate_state();
        let url = self.build_authorization_url(&pair.code_challenge, &state);
        AuthorizationRequest {
            url: url.into(),
            state,
            code_verifier: pair.code_verifier,
        }
    }

    /// Builds the authorize-endpoint URL. Pure construction, no network call.
    #[must_use]
    pub fn build_authorization_url(&self, code_challenge: &str, state: &str) -> Url {
        let scope = self.config.scopes.join(" ");

        let mut url = self.metadata.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("scope", &scope)
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256");
        url
    }

    /// Exchange an authorization code for tokens using PKCE.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OAuth`] if the token endpoint rejects the code,
    /// [`Error::Timeout`] when the deadline elapses, or [`Error::Http`] on
    /// other transport failures.
    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenSet, Error> {
        const OPERATION: &str = "token exchange";

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ];

        // client_secret_basic: credentials are form-urlencoded before base64 (RFC 6749 §2.3.1)
        let client_id = urlencoding::encode(&self.config.client_id);
        let client_secret = urlencoding::encode(&self.config.client_secret);

        let response = self
            .http
            .post(self.metadata.token_endpoint.clone())
            .timeout(self.config.timeout)
            .basic_auth(client_id, Some(client_secret))
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::from_transport(OPERATION, e))?;

        let received_at = OffsetDateTime::now_utc();
        let response = Self::ensure_success(response, OPERATION).await?;
        let token_response = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::from_transport(OPERATION, e))?;

        if !token_response.token_type.eq_ignore_ascii_case("bearer") {
            return Err(Error::OAuth {
                operation: OPERATION,
                status: None,
                detail: format!("unsupported token_type '{}'", token_response.token_type),
            });
        }

        Ok(TokenSet::from_response(token_response, received_at))
    }

    /// Fetch user info using an access token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the provider has no userinfo endpoint,
    /// [`Error::OAuth`] if the endpoint rejects the token, [`Error::Timeout`]
    /// or [`Error::Http`] on transport failure.
    pub async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo, Error> {
        const OPERATION: &str = "userinfo request";

        let endpoint = self
            .metadata
            .userinfo_endpoint
            .clone()
            .ok_or_else(|| Error::Config("provider has no userinfo endpoint".into()))?;

        let response = self
            .http
            .get(endpoint)
            .timeout(self.config.timeout)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::from_transport(OPERATION, e))?;

        let response = Self::ensure_success(response, OPERATION).await?;
        let claims = response
            .json::<ClaimSet>()
            .await
            .map_err(|e| Error::from_transport(OPERATION, e))?;
        UserInfo::try_from_claims(claims)
    }

    /// Checks an ID token returned by the token endpoint.
    ///
    /// The signature is verified against the provider's JWKS, `iss` must be
    /// the discovered issuer, `aud` must name this client, and `exp`/`nbf`/`iat`
    /// must hold.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdToken`] with the rejection reason.
    #[cfg(feature = "token")]
    pub async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedClaims, Error> {
        let validator =
            TokenValidator::new(self.id_token_keys.clone(), self.metadata.issuer.clone())?
                .with_audience(Some(self.config.client_id.clone()));
        validator
            .verify(id_token)
            .await
            .map_err(|e| Error::IdToken(e.to_string()))
    }

    /// Builds the RP-initiated logout URL. Pure construction, no network call.
    ///
    /// Returns `None` when the provider does not advertise an end-session endpoint.
    #[must_use]
    pub fn build_logout_url(&self, id_token: &str) -> Option<Url> {
        let mut url = self.metadata.end_session_endpoint.clone()?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("id_token_hint", id_token)
                .append_pair("client_id", &self.config.client_id);
            if let Some(target) = &self.config.post_logout_redirect_uri {
                query.append_pair("post_logout_redirect_uri", target.as_str());
            }
        }
        Some(url)
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::OAuth {
            operation,
            status: Some(status),
            detail: oauth_error_detail(&body),
        })
    }
}

#[cfg(feature = "token")]
fn id_token_key_ring(
    config: &OidcConfig,
    metadata: &ProviderMetadata,
    http: &reqwest::Client,
) -> KeyRing {
    KeyRing::new(metadata.jwks_uri.clone(), id_token_algorithm(metadata))
        .with_http_client(http.clone())
        .with_timeout(config.timeout)
}

/// RS256 (mandatory for OpenID providers) unless the provider advertises
/// only other asymmetric algorithms.
#[cfg(feature = "token")]
fn id_token_algorithm(metadata: &ProviderMetadata) -> Algorithm {
    let advertised = metadata
        .id_token_signing_alg_values_supported
        .as_deref()
        .unwrap_or_default();
    if advertised.is_empty() || advertised.iter().any(|alg| alg == "RS256") {
        return Algorithm::RS256;
    }
    advertised
        .iter()
        .filter_map(|alg| alg.parse::<Algorithm>().ok())
        .find(|alg| !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512))
        .unwrap_or(Algorithm::RS256)
}

/// Reduces an error body to `error: description` when it is an OAuth error
/// object, otherwise to a truncated copy of the body.
fn oauth_error_detail(body: &str) -> String {
    #[derive(Deserialize)]
    struct OAuthErrorBody {
        error: String,
        #[serde(default)]
        error_description: Option<String>,
    }

    match serde_json::from_str::<OAuthErrorBody>(body) {
        Ok(OAuthErrorBody {
            error,
            error_description: Some(description),
        }) => format!("{error}: {description}"),
        Ok(OAuthErrorBody { error, .. }) => error,
        Err(_) => body.chars().take(200).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> OidcConfig {
        OidcConfig::new(
            "https://idp.example.com/realms/demo".parse().unwrap(),
            "test-client",
            "test-secret",
            "https://app.example.com/callback".parse().unwrap(),
        )
        .with_post_logout_redirect_uri("https://app.example.com/".parse().unwrap())
    }

    fn test_metadata() -> ProviderMetadata {
        ProviderMetadata::new(
            "https://idp.example.com/realms/demo",
            "https://idp.example.com/realms/demo/auth".parse().unwrap(),
            "https://idp.example.com/realms/demo/token".parse().unwrap(),
            "https://idp.example.com/realms/demo/certs".parse().unwrap(),
        )
        .with_end_session_endpoint("https://idp.example.com/realms/demo/logout".parse().unwrap())
    }

    fn query_value(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_authorization_url_contains_pkce() {
        let client = OidcClient::new(test_config(), test_metadata());
        let req = client.authorization_request();
        let url: Url = req.url.parse().unwrap();

        assert_eq!(query_value(&url, "response_type").as_deref(), Some("code"));
        assert_eq!(query_value(&url, "client_id").as_deref(), Some("test-client"));
        assert_eq!(
            query_value(&url, "redirect_uri").as_deref(),
            Some("https://app.example.com/callback")
        );
        assert_eq!(
            query_value(&url, "scope").as_deref(),
            Some("openid profile email")
        );
        assert_eq!(
            query_value(&url, "code_challenge_method").as_deref(),
            Some("S256")
        );
        assert_eq!(
            query_value(&url, "code_challenge"),
            Some(pkce::generate_code_challenge(&req.code_verifier))
        );
        assert_eq!(query_value(&url, "state"), Some(req.state.clone()));
        assert!(!url.as_str().contains(&req.code_verifier));
    }

    #[test]
    fn test_authorization_request_unique_per_call() {
        let client = OidcClient::new(test_config(), test_metadata());
        let req1 = client.authorization_request();
        let req2 = client.authorization_request();

        assert_ne!(req1.state, req2.state);
        assert_ne!(req1.code_verifier, req2.code_verifier);
    }

    #[test]
    fn test_logout_url() {
        let client = OidcClient::new(test_config(), test_metadata());
        let url = client.build_logout_url("id.token.value").unwrap();

        assert!(url.as_str().starts_with("https://idp.example.com/realms/demo/logout?"));
        assert_eq!(
            query_value(&url, "id_token_hint").as_deref(),
            Some("id.token.value")
        );
        assert_eq!(
            query_value(&url, "post_logout_redirect_uri").as_deref(),
            Some("https://app.example.com/")
        );
    }

    #[test]
    fn test_logout_url_without_end_session_endpoint() {
        let mut metadata = test_metadata();
        metadata.end_session_endpoint = None;
        let client = OidcClient::new(test_config(), metadata);
        assert!(client.build_logout_url("id.token.value").is_none());
    }

    #[test]
    fn test_token_set_expiry_from_response() {
        let response = TokenResponse {
            access_token: "at".into(),
            token_type: "Bearer".into(),
            expires_in: Some(300),
            refresh_token: None,
            id_token: Some("it".into()),
            scope: None,
        };
        let now = OffsetDateTime::now_utc();
        let set = TokenSet::from_response(response, now);
        assert_eq!(set.expires_at, Some(now + time::Duration::seconds(300)));
        assert!(!set.is_expired());

        let expired = TokenSet::new("at", None)
            .with_expires_at(now - time::Duration::seconds(1));
        assert!(expired.is_expired());
    }

    #[test]
    fn test_token_set_debug_redacts() {
        let set = TokenSet::new("secret-access", Some("secret-id".into()));
        let rendered = format!("{set:?}");
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-id"));
    }

    #[test]
    fn test_config_debug_redacts_secret() {
        let rendered = format!("{:?}", test_config());
        assert!(!rendered.contains("test-secret"));
    }

    #[test]
    fn test_oauth_error_detail() {
        assert_eq!(
            oauth_error_detail(r#"{"error":"invalid_grant","error_description":"Code not valid"}"#),
            "invalid_grant: Code not valid"
        );
        assert_eq!(oauth_error_detail(r#"{"error":"invalid_grant"}"#), "invalid_grant");
        assert_eq!(oauth_error_detail("Bad Gateway"), "Bad Gateway");
    }

    #[cfg(feature = "token")]
    #[test]
    fn test_id_token_algorithm_from_discovery() {
        let mut metadata = test_metadata();
        assert_eq!(id_token_algorithm(&metadata), Algorithm::RS256);

        metadata.id_token_signing_alg_values_supported =
            Some(vec!["HS256".into(), "ES256".into()]);
        assert_eq!(id_token_algorithm(&metadata), Algorithm::ES256);

        metadata.id_token_signing_alg_values_supported =
            Some(vec!["ES256".into(), "RS256".into()]);
        assert_eq!(id_token_algorithm(&metadata), Algorithm::RS256);

        metadata.id_token_signing_alg_values_supported = Some(vec!["HS512".into()]);
        assert_eq!(id_token_algorithm(&metadata), Algorithm::RS256);
    }

    #[test]
    fn test_userinfo_requires_sub() {
        let claims: ClaimSet = serde_json::from_str(r#"{"email":"a@example.com"}"#).unwrap();
        assert!(UserInfo::try_from_claims(claims).is_err());

        let claims: ClaimSet =
            serde_json::from_str(r#"{"sub":"u1","preferred_username":"alice"}"#).unwrap();
        let info = UserInfo::try_from_claims(claims).unwrap();
        assert_eq!(info.sub(), "u1");
        assert_eq!(info.claims().preferred_username(), Some("alice"));
    }
}
