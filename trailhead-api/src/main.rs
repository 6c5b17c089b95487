use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trailhead_api::{app, state::{payment_adapter, AppState}};
use trailhead_booking::LoggingNotifier;
use trailhead_store::{Config, Stores};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trailhead_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!(
        port = config.server.port,
        storage = ?config.storage.backend,
        payments = ?config.payment.provider,
        "Starting Trailhead API"
    );

    let stores = Stores::connect(&config).await.context("Failed to initialise storage")?;
    let payments = payment_adapter(&config.payment).context("Failed to configure payment adapter")?;
    let state = AppState::build(&config, stores, payments, Arc::new(LoggingNotifier::new()))
        .await
        .context("Failed to register workflows")?;

    let cancel = CancellationToken::new();
    let jobs = if config.workflows.scheduler_enabled {
        state.scheduler.run(cancel.clone())
    } else {
        tracing::info!("Scheduler disabled");
        Vec::new()
    };

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    cancel.cancel();
    for job in jobs {
        let _ = job.await;
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
