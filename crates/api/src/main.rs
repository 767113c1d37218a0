use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use smsreport_api::app::{build_app, AppServices};
use smsreport_infra::ServiceConfig;

/// How long shutdown waits for in-flight report workers.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().context("invalid configuration")?;

    smsreport_observability::init(config.log_format);

    let services = Arc::new(
        AppServices::from_config(&config)
            .await
            .context("failed to initialize report stores")?,
    );
    let sweeper = services.sweeper.clone().spawn_interval(config.sweep_interval);

    let app = build_app(services.clone());
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        reports_dir = %config.reports_dir.display(),
        workers = config.max_concurrent_workers,
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.abort();
    let pool = services.pool();
    pool.close();
    if tokio::time::timeout(DRAIN_TIMEOUT, pool.wait_idle()).await.is_err() {
        tracing::warn!(
            in_flight = pool.in_flight(),
            "report workers still running at shutdown; the sweep will recover them"
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
