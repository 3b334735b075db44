//! Binary entry point.
//!
//! Grounded on the teacher's `crates/api/src/main.rs`: same tracing-init /
//! config-load / build-router / `axum::serve` shape. This crate ships only
//! the `MediaEngine` trait and an in-memory `MockEngine` (see
//! `engine::mock`); a production deployment would swap in an adapter over a
//! real engine (the teacher links `mediasoup` directly) behind the same
//! trait without touching anything above `WorkerPool`.

use std::sync::Arc;
use sfu_core::config::Settings;
use sfu_core::engine::mock::MockEngine;
use sfu_core::gateway::storage::GatewayStorage;
use sfu_core::gateway::GatewayState;
use sfu_core::metrics::Metrics;
use sfu_core::registry::ConferenceRegistry;
use sfu_core::worker_pool::WorkerPool;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sfu_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load()?;
    tracing::info!(port = settings.app.port, "starting conference core");

    let engine = MockEngine::new();
    let worker_pool = Arc::new(WorkerPool::new(&engine, &settings.media).await?);
    tracing::info!(workers = worker_pool.worker_count(), "media workers ready");

    let registry = Arc::new(ConferenceRegistry::new(
        worker_pool,
        settings.media.max_participants_per_conference,
    ));
    let storage = Arc::new(GatewayStorage::new());
    let metrics = Arc::new(Metrics::new()?);

    let state = GatewayState {
        registry,
        storage,
        metrics,
    };
    let app = sfu_core::build_router(state);

    let addr = format!("0.0.0.0:{}", settings.app.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
