use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use feedlens_api::app::{build_app, build_services};
use feedlens_api::middleware::HeaderIdentityResolver;
use feedlens_infra::AppConfig;

/// How often finished jobs past their retention window are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    feedlens_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let services = Arc::new(build_services(&config).context("failed to build services")?);

    // Decide broker availability once, up front. Requests never wait on it.
    let connections = services.pipeline.connections().clone();
    if !connections.probe().await {
        tracing::warn!("starting without a broker; status lookups will use the store only");
    }

    let sweeper = {
        let services = services.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                if let Some(removed) = services.pipeline.queue().collect_expired(chrono::Utc::now()).await {
                    if removed > 0 {
                        tracing::info!(removed, "expired finished jobs");
                    }
                }
            }
        })
    };

    let app = build_app(services, Arc::new(HeaderIdentityResolver::default()));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.abort();
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
