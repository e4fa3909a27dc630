//! Kernel proxy server binary.
//!
//! Configuration comes from `JUPYTER_`-prefixed environment variables,
//! e.g. `JUPYTER_SERVER_URL=http://localhost:8888 kernel-proxy`.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kernel_proxy_client::{KernelApiClient, WebSocketConnector};
use kernel_proxy_core::ProxySettings;
use kernel_proxy_session::{ExecutionTracker, RetryPolicy, SessionRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let settings = ProxySettings::from_env()?;
    tracing::info!(server_url = %settings.server_url, "starting kernel proxy");

    let tracker = Arc::new(ExecutionTracker::new());
    let api = KernelApiClient::new(settings.clone())?;
    let connector = WebSocketConnector::new(settings.clone());
    let registry = Arc::new(SessionRegistry::new(
        api,
        connector,
        Arc::clone(&tracker),
        RetryPolicy::from_settings(&settings),
    ));

    let app = kernel_proxy_server::router(registry);

    let listener = tokio::net::TcpListener::bind(&settings.listen_addr).await?;
    tracing::info!(addr = %settings.listen_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
