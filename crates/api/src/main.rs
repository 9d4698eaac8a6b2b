//! Chexmix push API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use chexmix_common::clock::{Clock, SystemClock};
use chexmix_common::config::AppConfig;
use chexmix_engine::capability::Capability;
use chexmix_engine::scheduler::Scheduler;
use chexmix_notifier::delivery::DeliveryClient;
use chexmix_notifier::retry::RetryPolicy;
use chexmix_notifier::transport::WebPushTransport;
use chexmix_notifier::worker::spawn_workers;

use chexmix_api::routes::create_router;
use chexmix_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "chexmix_api=debug,chexmix_engine=debug,chexmix_notifier=debug,tower_http=debug",
            )
        }))
        .init();

    tracing::info!("Starting chexmix push API server...");

    let config = AppConfig::from_env()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let capability = Capability::from_config(&config).await?;
    let scheduler = Scheduler::new(capability.clone(), clock.clone());

    // Workers only run when scheduling is switched on
    let workers = match (capability.queue(), config.vapid_keys()) {
        (Some(queue), Some((_, private_key))) => {
            let timeout = Duration::from_millis(config.delivery_timeout_ms);
            let transport = WebPushTransport::new(private_key, config.vapid_subject.clone(), timeout)?;
            let delivery = Arc::new(DeliveryClient::new(
                Arc::new(transport),
                config.push_ttl_seconds,
                timeout,
            ));
            let retry = RetryPolicy::from_config(&config)?;

            tracing::info!(
                workers = config.worker_concurrency,
                retry = ?retry,
                "Starting push workers"
            );

            spawn_workers(
                config.worker_concurrency,
                queue.clone(),
                delivery,
                retry,
                clock.clone(),
                Duration::from_millis(config.worker_poll_interval_ms),
            )
        }
        _ => Vec::new(),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::new(scheduler, config);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for worker in &workers {
        worker.abort();
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
