//! Shared fixtures: a wiremock identity provider and an RSA token minter.

#![allow(dead_code)]

use std::time::Duration;

use axum::body::Body;
use axum::http::Response;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use time::OffsetDateTime;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use oidc_sso::OidcConfig;

pub const KID: &str = "test-key-1";
pub const ISSUER: &str = "https://idp.example.com/realms/demo";
pub const AUDIENCE: &str = "demo-api";
pub const CLIENT_ID: &str = "web-bff";
pub const CLIENT_SECRET: &str = "bff-secret";

/// Public modulus of `fixtures/signing_key.pem`.
pub const RSA_N: &str = "iDcaugDRQImpz1BDAZWKRCJY27UKJDMLvSIptthFQ1kyzfHhwe1ZhTM9xw4jGS2h-XmpJALxGIyEt_4qYjAt9gMa_-bNEyyeinAjBjt8e0_wJYT01Rq4CetcQlTAN8Vimc1v6eWAqtLABePoyKa2r2rMC-SS03FoMyZhlObnCYopVdcgS2ZLL19FFfe_VDkafjdEEEalyY4pAgIteFmkWD8Ebe06oBS6Tqhf-Q9sK39GgcFOxXcS87DByDpFYKxictvXs-bfAjfHLStcqkx-8cEZn73g6TY_1gXAHnC8jdMEttL95Z-QSZvLaLKN3s4aay-2sRnPCwVRC9QV1BER0Q";
pub const RSA_E: &str = "AQAB";

const SIGNING_KEY: &[u8] = include_bytes!("../fixtures/signing_key.pem");
const OTHER_KEY: &[u8] = include_bytes!("../fixtures/other_key.pem");

pub fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// JWKS document publishing the fixture key under `kid`.
pub fn jwks_body(kid: &str) -> Value {
    json!({
        "keys": [{
            "kty": "RSA",
            "kid": kid,
            "use": "sig",
            "alg": "RS256",
            "n": RSA_N,
            "e": RSA_E,
        }]
    })
}

/// Access token claims for `alice`, expiring `exp_in` seconds from now.
pub fn access_claims(exp_in: i64) -> Value {
    let now = now();
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": "u1",
        "preferred_username": "alice",
        "email": "alice@example.com",
        "realm_access": { "roles": ["admin", "user"] },
        "iat": now - 10,
        "exp": now + exp_in,
    })
}

fn header(alg: Algorithm, kid: Option<&str>) -> Header {
    let mut header = Header::new(alg);
    header.kid = kid.map(String::from);
    header
}

/// RS256 token signed with the published fixture key.
pub fn sign(kid: Option<&str>, claims: &Value) -> String {
    sign_as(Algorithm::RS256, kid, claims)
}

/// Token signed with the fixture key under an arbitrary RSA algorithm.
pub fn sign_as(alg: Algorithm, kid: Option<&str>, claims: &Value) -> String {
    let key = EncodingKey::from_rsa_pem(SIGNING_KEY).unwrap();
    encode(&header(alg, kid), claims, &key).unwrap()
}

/// RS256 token signed with a key that is not in any published set.
pub fn sign_with_unpublished_key(kid: Option<&str>, claims: &Value) -> String {
    let key = EncodingKey::from_rsa_pem(OTHER_KEY).unwrap();
    encode(&header(Algorithm::RS256, kid), claims, &key).unwrap()
}

/// Mock server answering `GET /certs` with the fixture JWKS.
pub async fn jwks_server(kid: &str, delay: Duration, expected_fetches: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(jwks_body(kid))
                .set_delay(delay),
        )
        .expect(expected_fetches)
        .mount(&server)
        .await;
    server
}

/// A mock OpenID provider serving discovery and its key set. Flow endpoints
/// are mounted per test.
pub struct MockIdp {
    pub server: MockServer,
}

impl MockIdp {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": base,
                "authorization_endpoint": format!("{base}/auth"),
                "token_endpoint": format!("{base}/token"),
                "userinfo_endpoint": format!("{base}/userinfo"),
                "jwks_uri": format!("{base}/certs"),
                "end_session_endpoint": format!("{base}/logout"),
                "response_types_supported": ["code"],
                "code_challenge_methods_supported": ["plain", "S256"],
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body(KID)))
            .mount(&server)
            .await;
        Self { server }
    }

    /// ID token claims this provider would issue to the BFF client for `sub`.
    pub fn id_token_claims(&self, sub: &str) -> Value {
        let now = now();
        json!({
            "iss": self.issuer(),
            "aud": CLIENT_ID,
            "sub": sub,
            "iat": now - 10,
            "exp": now + 300,
        })
    }

    /// Signed ID token for `sub`.
    pub fn id_token(&self, sub: &str) -> String {
        sign(Some(KID), &self.id_token_claims(sub))
    }

    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server.uri())
    }

    pub fn oidc_config(&self) -> OidcConfig {
        OidcConfig::new(
            self.issuer().parse().unwrap(),
            CLIENT_ID,
            CLIENT_SECRET,
            "http://localhost:3000/callback".parse().unwrap(),
        )
        .with_post_logout_redirect_uri("http://localhost:3000/".parse().unwrap())
    }
}

/// Reads a JSON response body.
pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// `Location` header of a redirect.
pub fn location(response: &Response<Body>) -> String {
    response.headers()["location"].to_str().unwrap().to_string()
}
