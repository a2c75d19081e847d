mod common;

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use oidc_sso::{KeyId, KeyRing};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{KID, jwks_body, jwks_server};

fn ring_for(server: &MockServer) -> KeyRing {
    KeyRing::new(
        format!("{}/certs", server.uri()).parse().unwrap(),
        Algorithm::RS256,
    )
}

#[tokio::test]
async fn test_concurrent_misses_fetch_once() {
    let server = jwks_server(KID, Duration::from_millis(200), 1).await;
    // no cooldown: only the single-flight guard prevents extra fetches
    let ring = Arc::new(ring_for(&server).with_cooldown(Duration::ZERO));

    let lookups: Vec<_> = (0..16)
        .map(|_| {
            let ring = ring.clone();
            tokio::spawn(async move { ring.get_key(&KeyId::from(KID)).await })
        })
        .collect();

    for lookup in lookups {
        assert!(lookup.await.unwrap().is_ok());
    }
    assert_eq!(ring.fetch_count(), 1);
}

#[tokio::test]
async fn test_fresh_hits_served_from_cache() {
    let server = jwks_server(KID, Duration::ZERO, 1).await;
    let ring = ring_for(&server);

    for _ in 0..5 {
        ring.get_key(&KeyId::from(KID)).await.unwrap();
    }
    assert_eq!(ring.fetch_count(), 1);
}

#[tokio::test]
async fn test_unknown_kid_within_cooldown_does_not_refetch() {
    let server = jwks_server(KID, Duration::ZERO, 1).await;
    let ring = ring_for(&server);

    ring.get_key(&KeyId::from(KID)).await.unwrap();

    let err = ring.get_key(&KeyId::from("random-1")).await.err().unwrap();
    assert!(err.to_string().contains("random-1"));
    assert!(ring.get_key(&KeyId::from("random-2")).await.is_err());

    assert_eq!(ring.fetch_count(), 1);
}

#[tokio::test]
async fn test_rotated_key_found_after_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body("old-key")))
        .mount(&server)
        .await;

    let ring = ring_for(&server).with_cooldown(Duration::ZERO);
    ring.get_key(&KeyId::from("old-key")).await.unwrap();

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body("new-key")))
        .expect(1)
        .mount(&server)
        .await;

    ring.get_key(&KeyId::from("new-key")).await.unwrap();
    assert_eq!(ring.fetch_count(), 2);
}

#[tokio::test]
async fn test_stale_key_served_when_refresh_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let ring = ring_for(&server).with_max_age(Duration::ZERO);
    ring.load(serde_json::from_value(jwks_body(KID)).unwrap())
        .unwrap();

    assert!(ring.get_key(&KeyId::from(KID)).await.is_ok());
    assert_eq!(ring.fetch_count(), 1);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let ring = ring_for(&server);
    assert!(ring.get_key(&KeyId::from(KID)).await.is_err());
    assert!(ring.refresh().await.is_err());
}

#[tokio::test]
async fn test_token_without_kid_needs_single_key() {
    let server = MockServer::start().await;
    let mut two_keys = jwks_body("a");
    let second = jwks_body("b")["keys"][0].clone();
    two_keys["keys"].as_array_mut().unwrap().push(second);
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(two_keys))
        .mount(&server)
        .await;

    let ring = ring_for(&server);
    assert!(ring.get_default_key().await.is_err());

    let single = ring_for(&server);
    single
        .load(serde_json::from_value(jwks_body(KID)).unwrap())
        .unwrap();
    assert!(single.get_default_key().await.is_ok());
}

#[tokio::test]
async fn test_outage_with_stale_keys_fetches_once_per_cooldown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let ring = ring_for(&server).with_max_age(Duration::ZERO);
    ring.load(serde_json::from_value(jwks_body(KID)).unwrap())
        .unwrap();

    for _ in 0..10 {
        assert!(ring.get_key(&KeyId::from(KID)).await.is_ok());
    }
    assert!(ring.get_default_key().await.is_ok());
    assert_eq!(ring.fetch_count(), 1);
}

#[tokio::test]
async fn test_stale_keys_refetched_after_cooldown() {
    let server = jwks_server(KID, Duration::ZERO, 2).await;
    let ring = ring_for(&server)
        .with_max_age(Duration::ZERO)
        .with_cooldown(Duration::from_millis(50));

    ring.get_key(&KeyId::from(KID)).await.unwrap();
    ring.get_key(&KeyId::from(KID)).await.unwrap();
    assert_eq!(ring.fetch_count(), 1);

    tokio::time::sleep(Duration::from_millis(80)).await;
    ring.get_key(&KeyId::from(KID)).await.unwrap();
    assert_eq!(ring.fetch_count(), 2);
}
