mod common;

use serde_json::json;
use wiremock::matchers::{body_string_contains, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use oidc_sso::{Error, OidcClient, OidcConfig};

use common::{CLIENT_ID, CLIENT_SECRET, MockIdp};

#[tokio::test]
async fn test_discovery_binds_endpoints() {
    let idp = MockIdp::start().await;
    let client = OidcClient::discover(idp.oidc_config()).await.unwrap();

    assert_eq!(client.metadata().token_endpoint.as_str(), idp.url("/token"));
    assert!(client.metadata().end_session_endpoint.is_some());
}

#[tokio::test]
async fn test_discovery_rejects_foreign_issuer() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": "https://evil.example.com",
            "authorization_endpoint": format!("{base}/auth"),
            "token_endpoint": format!("{base}/token"),
            "jwks_uri": format!("{base}/certs"),
        })))
        .mount(&server)
        .await;

    let config = OidcConfig::new(
        base.parse().unwrap(),
        CLIENT_ID,
        CLIENT_SECRET,
        "http://localhost:3000/callback".parse().unwrap(),
    );
    let err = OidcClient::discover(config).await.unwrap_err();
    assert!(matches!(err, Error::Discovery(_)), "{err}");
}

#[tokio::test]
async fn test_discovery_unreachable() {
    let server = MockServer::start().await;
    let config = OidcConfig::new(
        server.uri().parse().unwrap(),
        CLIENT_ID,
        CLIENT_SECRET,
        "http://localhost:3000/callback".parse().unwrap(),
    );
    // no discovery mock mounted: wiremock answers 404
    let err = OidcClient::discover(config).await.unwrap_err();
    assert!(matches!(err, Error::Discovery(_)));
}

#[tokio::test]
async fn test_exchange_sends_pkce_verifier_and_client_auth() {
    let idp = MockIdp::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header_exists("authorization"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc"))
        .and(body_string_contains("code_verifier=verifier-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "token_type": "bearer",
            "expires_in": 60,
        })))
        .expect(1)
        .mount(&idp.server)
        .await;

    let client = OidcClient::discover(idp.oidc_config()).await.unwrap();
    let tokens = client.exchange_code("abc", "verifier-1").await.unwrap();
    assert_eq!(tokens.access_token, "access-1");
    assert!(tokens.id_token.is_none());
    assert!(!tokens.is_expired());
}

#[tokio::test]
async fn test_exchange_error_carries_oauth_detail() {
    let idp = MockIdp::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Code not valid",
        })))
        .mount(&idp.server)
        .await;

    let client = OidcClient::discover(idp.oidc_config()).await.unwrap();
    let err = client.exchange_code("used", "v").await.unwrap_err();
    match err {
        Error::OAuth { status, detail, .. } => {
            assert_eq!(status, Some(400));
            assert!(detail.contains("invalid_grant"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_userinfo_requires_sub() {
    let idp = MockIdp::start().await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "email": "a@b.c" })))
        .mount(&idp.server)
        .await;

    let client = OidcClient::discover(idp.oidc_config()).await.unwrap();
    assert!(client.fetch_user_info("access-1").await.is_err());
}

#[tokio::test]
async fn test_logout_url() {
    let idp = MockIdp::start().await;
    let client = OidcClient::discover(idp.oidc_config()).await.unwrap();

    let url = client.build_logout_url("id-1").unwrap();
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    assert!(pairs.contains(&("id_token_hint".into(), "id-1".into())));
    assert!(pairs.contains(&("client_id".into(), CLIENT_ID.into())));
    assert!(pairs.contains(&(
        "post_logout_redirect_uri".into(),
        "http://localhost:3000/".into()
    )));
}
