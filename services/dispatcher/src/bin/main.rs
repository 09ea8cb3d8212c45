use std::sync::Arc;

use dispatcher::{DispatchOrchestrator, WorkerPool};
use selector::CandidateSelector;
use shared::coordination::kv::RedisKvStore;
use shared::coordination::pubsub::RedisEventBus;
use shared::ports::logging_defaults::{LoggingNotificationSink, LoggingPushProvider, UnconfiguredRouteMatrixClient};
use shared::queue::NatsInstantOrderQueue;
use shared::store::{PostgresDriverStore, PostgresOrderStore};
use shared::Settings;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shared::logger::init();
    let settings = Settings::load()?;

    let pg_pool = sqlx::postgres::PgPoolOptions::new().connect(&settings.postgres_url).await?;

    let redis_cfg = deadpool_redis::Config::from_url(&settings.redis_url);
    let redis_pool = redis_cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
    let redis_client = redis::Client::open(settings.redis_url.as_str())?;

    let kv: Arc<dyn shared::coordination::KvStore> = Arc::new(RedisKvStore::new(redis_pool));
    let event_bus: Arc<dyn shared::coordination::EventBus> = Arc::new(RedisEventBus::new(redis_client));

    let order_store: Arc<dyn shared::ports::OrderStore> = Arc::new(PostgresOrderStore::new(pg_pool.clone()));
    let driver_store: Arc<dyn shared::ports::DriverStore> = Arc::new(PostgresDriverStore::new(pg_pool));

    let route_client: Arc<dyn shared::ports::RouteMatrixClient> = Arc::new(UnconfiguredRouteMatrixClient);
    let push: Arc<dyn shared::ports::PushProvider> = Arc::new(LoggingPushProvider);
    let notifications: Arc<dyn shared::ports::NotificationSink> = Arc::new(LoggingNotificationSink);

    let queue = Arc::new(NatsInstantOrderQueue::connect(&settings.nats_url).await?);

    let candidate_selector = Arc::new(CandidateSelector::new(driver_store, route_client, kv.clone(), settings.clone()));

    let orchestrator = Arc::new(DispatchOrchestrator::new(
        kv,
        event_bus,
        order_store,
        push,
        notifications,
        candidate_selector,
        settings,
    ));

    let health = shared::health::HealthState::new();
    health.set_postgres_up(true);
    health.set_redis_up(true);
    health.set_nats_up(true);

    let cancellation = CancellationToken::new();
    let pool = WorkerPool::new(orchestrator, queue);

    let worker_cancellation = cancellation.clone();
    let worker_handle = tokio::spawn(async move { pool.run(worker_cancellation).await });

    let health_cancellation = cancellation.clone();
    let health_handle = tokio::spawn(shared::health::run_periodic_reporter(health, 60, health_cancellation));

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining in-flight dispatches");
    cancellation.cancel();

    let _ = worker_handle.await;
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
