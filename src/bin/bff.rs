//! Backend-for-frontend: runs the login flow and holds sessions.

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use oidc_sso::OidcClient;
use oidc_sso::middleware::{BffConfig, BffState, MemorySessionStore, bff_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BffConfig::from_env().context("invalid BFF configuration")?;

    // Without the provider's endpoints there is nothing to serve.
    let client = OidcClient::discover(config.oidc().clone())
        .await
        .context("OIDC discovery failed")?;

    let store = MemorySessionStore::new(config.idle_ttl());
    let app = bff_routes(BffState::new(config, client, store));

    let port: u16 = match std::env::var("PORT") {
        Ok(p) => p.parse().context("PORT must be a port number")?,
        Err(_) => 3000,
    };
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;

    tracing::info!(port, "BFF listening");
    axum::serve(listener, app).await?;
    Ok(())
}
