//! Resource server: serves the API behind bearer-token validation.

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use oidc_sso::resource::{ResourceConfig, ResourceState, resource_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ResourceConfig::from_env().context("invalid resource server configuration")?;
    let state = ResourceState::from_config(&config)?;

    // Keys are fetched lazily anyway; a cold start only costs the first request.
    if let Err(e) = state.validator().key_ring().refresh().await {
        tracing::warn!(error = %e, jwks_uri = %config.jwks_uri, "Initial JWKS fetch failed");
    }

    let app = resource_routes(state);

    let port: u16 = match std::env::var("PORT") {
        Ok(p) => p.parse().context("PORT must be a port number")?,
        Err(_) => 4000,
    };
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;

    tracing::info!(port, issuer = %config.issuer, "Resource server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
