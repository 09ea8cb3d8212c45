use std::sync::Arc;

use converter::ScheduledConverter;
use shared::ports::logging_defaults::LoggingPushProvider;
use shared::queue::NatsInstantOrderQueue;
use shared::store::{PostgresDriverStore, PostgresOrderStore};
use shared::Settings;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shared::logger::init();
    let settings = Settings::load()?;

    let pg_pool = sqlx::postgres::PgPoolOptions::new().connect(&settings.postgres_url).await?;

    let order_store: Arc<dyn shared::ports::OrderStore> = Arc::new(PostgresOrderStore::new(pg_pool.clone()));
    let driver_store: Arc<dyn shared::ports::DriverStore> = Arc::new(PostgresDriverStore::new(pg_pool));
    let push: Arc<dyn shared::ports::PushProvider> = Arc::new(LoggingPushProvider);
    let queue: Arc<dyn shared::ports::InstantOrderProducer> = Arc::new(NatsInstantOrderQueue::connect(&settings.nats_url).await?);

    let converter = Arc::new(ScheduledConverter::new(order_store, driver_store, push, queue, settings));

    let health = shared::health::HealthState::new();
    health.set_postgres_up(true);
    health.set_nats_up(true);

    let cancellation = CancellationToken::new();
    let converter_cancellation = cancellation.clone();
    let handle = tokio::spawn(async move { converter.run(converter_cancellation).await });

    let health_cancellation = cancellation.clone();
    let health_handle = tokio::spawn(shared::health::run_periodic_reporter(health, 60, health_cancellation));

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, finishing in-flight tick");
    cancellation.cancel();

    let _ = handle.await;
    let _ = health_handle.await;
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
