//! End-to-end dispatch scenarios, driven against the in-memory fakes
//! rather than real Redis/Postgres/NATS. Mirrors the six walk-throughs
//! used to pin down the wait-loop's event race.

mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use converter::conversion::run_conversion_pass;
use dispatcher::DispatchOrchestrator;
use offer::wait_loop::wait_for_response;
use selector::CandidateSelector;
use shared::coordination::fake::{InMemoryEventBus, InMemoryKvStore};
use shared::coordination::pubsub::{order_response_channel, DRIVER_STATUS_CHANGES_CHANNEL, ORDER_STATUS_CHANGES_CHANNEL};
use shared::coordination::{dispatch_lock, EventBus, KvStore};
use shared::domain::{FleetTag, OrderStatus};
use shared::ports::fake::{FakeNotificationSink, FakePushProvider, FakeRouteMatrixClient, InMemoryDriverStore, InMemoryOrderStore, InMemoryQueue};
use shared::ports::{InstantOrderProducer, OrderStore, RouteLeg};
use shared::Settings;
use tokio_util::sync::CancellationToken;

use common::{driver, instant_order, scheduled_order};

fn spec_settings() -> Settings {
    let mut s = Settings::default();
    s.t_round_secs = 19;
    s
}

#[tokio::test(start_paused = true)]
async fn scenario_1_happy_path_first_candidate_accepts() {
    let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
    let order_store = Arc::new(InMemoryOrderStore::new());
    let driver_store = Arc::new(InMemoryDriverStore::new());
    driver_store.seed(driver("D1", FleetTag::Wei));
    let mut d2 = driver("D2", FleetTag::Wei);
    d2.location = Some(shared::domain::Coordinate::new(25.01, 121.5));
    driver_store.seed(d2);

    let push = Arc::new(FakePushProvider::new());
    let notifications = Arc::new(FakeNotificationSink::new());
    let route_client = Arc::new(FakeRouteMatrixClient::returning(vec![
        RouteLeg { distance_km: 1.0, time_minutes: 5.0 },
        RouteLeg { distance_km: 2.0, time_minutes: 7.0 },
    ]));
    let settings = spec_settings();

    let selector = Arc::new(CandidateSelector::new(driver_store, route_client, kv.clone(), settings.clone()));
    let orchestrator = DispatchOrchestrator::new(kv, bus.clone(), order_store.clone(), push.clone(), notifications, selector, settings);

    let order = instant_order(FleetTag::Wei);
    order_store.insert(&order).await.unwrap();
    let order_id = order.id.to_string();

    let bus_pub = bus.clone();
    let id_for_task = order_id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(StdDuration::from_secs(3)).await;
        bus_pub
            .publish(
                &order_response_channel(&id_for_task),
                serde_json::json!({ "order_id": id_for_task, "driver_id": "D1", "action": "accept", "timestamp": Utc::now() }),
            )
            .await
            .unwrap();
    });

    orchestrator.handle_order(order, CancellationToken::new()).await;

    let fresh = order_store.get(&order_id).await.unwrap().unwrap();
    assert_eq!(fresh.status, OrderStatus::Enroute);
    assert_eq!(fresh.assigned_driver.as_deref(), Some("D1"));
    assert_eq!(push.sent.lock().len(), 1, "D2 must never be offered once D1 accepted");
}

#[tokio::test(start_paused = true)]
async fn scenario_2_timeout_then_second_candidate_accepts() {
    let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
    let order_store = Arc::new(InMemoryOrderStore::new());
    let driver_store = Arc::new(InMemoryDriverStore::new());
    driver_store.seed(driver("D1", FleetTag::Wei));
    let mut d2 = driver("D2", FleetTag::Wei);
    d2.location = Some(shared::domain::Coordinate::new(25.01, 121.5));
    driver_store.seed(d2);

    let push = Arc::new(FakePushProvider::new());
    let notifications = Arc::new(FakeNotificationSink::new());
    let route_client = Arc::new(FakeRouteMatrixClient::returning(vec![
        RouteLeg { distance_km: 1.0, time_minutes: 5.0 },
        RouteLeg { distance_km: 2.0, time_minutes: 7.0 },
    ]));
    let settings = spec_settings();

    let selector = Arc::new(CandidateSelector::new(driver_store, route_client, kv.clone(), settings.clone()));
    let orchestrator = DispatchOrchestrator::new(kv.clone(), bus.clone(), order_store.clone(), push.clone(), notifications, selector, settings);

    let order = instant_order(FleetTag::Wei);
    order_store.insert(&order).await.unwrap();
    let order_id = order.id.to_string();

    let bus_pub = bus.clone();
    let id_for_task = order_id.clone();
    tokio::spawn(async move {
        // D1's timeout fires at t=19; D2 is offered right after. Accept
        // a few seconds into D2's own window.
        tokio::time::sleep(StdDuration::from_secs(22)).await;
        bus_pub
            .publish(
                &order_response_channel(&id_for_task),
                serde_json::json!({ "order_id": id_for_task, "driver_id": "D2", "action": "accept", "timestamp": Utc::now() }),
            )
            .await
            .unwrap();
    });

    orchestrator.handle_order(order, CancellationToken::new()).await;

    let fresh = order_store.get(&order_id).await.unwrap().unwrap();
    assert_eq!(fresh.status, OrderStatus::Enroute);
    assert_eq!(fresh.assigned_driver.as_deref(), Some("D2"));
    assert_eq!(push.sent.lock().len(), 2, "both D1 and D2 should have been offered, never D1 twice");

    assert!(shared::coordination::notifying_order::is_blacklisted(&kv, "D1", "123 Main St").await.unwrap());
    assert!(fresh.log.iter().any(|e| e.kind == shared::domain::OrderEventKind::DriverTimeout && e.driver_id.as_deref() == Some("D1")));
    assert!(fresh.log.iter().any(|e| e.kind == shared::domain::OrderEventKind::DriverAccept && e.driver_id.as_deref() == Some("D2")));
}

#[tokio::test(start_paused = true)]
async fn scenario_3_order_cancelled_mid_wait_stops_without_timeout_bookkeeping() {
    let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
    let order_store = Arc::new(InMemoryOrderStore::new());
    let driver_store = Arc::new(InMemoryDriverStore::new());
    driver_store.seed(driver("D1", FleetTag::Wei));
    let mut d2 = driver("D2", FleetTag::Wei);
    d2.location = Some(shared::domain::Coordinate::new(25.01, 121.5));
    driver_store.seed(d2);

    let push = Arc::new(FakePushProvider::new());
    let notifications = Arc::new(FakeNotificationSink::new());
    let route_client = Arc::new(FakeRouteMatrixClient::returning(vec![
        RouteLeg { distance_km: 1.0, time_minutes: 5.0 },
        RouteLeg { distance_km: 2.0, time_minutes: 7.0 },
    ]));
    let settings = spec_settings();

    let selector = Arc::new(CandidateSelector::new(driver_store, route_client, kv.clone(), settings.clone()));
    let orchestrator = DispatchOrchestrator::new(kv, bus.clone(), order_store.clone(), push.clone(), notifications, selector, settings);

    let order = instant_order(FleetTag::Wei);
    order_store.insert(&order).await.unwrap();
    let order_id = order.id.to_string();

    let bus_pub = bus.clone();
    let id_for_task = order_id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(StdDuration::from_secs(4)).await;
        bus_pub
            .publish(
                ORDER_STATUS_CHANGES_CHANNEL,
                serde_json::json!({
                    "order_id": id_for_task,
                    "old_status": "waiting",
                    "new_status": "cancelled",
                    "driver_id": null,
                    "timestamp": Utc::now(),
                    "reason": "customer cancelled",
                    "event_type": "status_change",
                }),
            )
            .await
            .unwrap();
    });

    orchestrator.handle_order(order, CancellationToken::new()).await;

    let fresh = order_store.get(&order_id).await.unwrap().unwrap();
    assert_eq!(push.sent.lock().len(), 1, "D2 should never be tried once the order is cancelled out from under D1's offer");
    assert!(!fresh.log.iter().any(|e| e.kind == shared::domain::OrderEventKind::DriverTimeout));
}

#[tokio::test(start_paused = true)]
async fn scenario_4_driver_becomes_busy_elsewhere_moves_to_next_candidate() {
    let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
    let order_store = Arc::new(InMemoryOrderStore::new());
    let driver_store = Arc::new(InMemoryDriverStore::new());
    driver_store.seed(driver("D1", FleetTag::Wei));
    let mut d2 = driver("D2", FleetTag::Wei);
    d2.location = Some(shared::domain::Coordinate::new(25.01, 121.5));
    driver_store.seed(d2);

    let push = Arc::new(FakePushProvider::new());
    let notifications = Arc::new(FakeNotificationSink::new());
    let route_client = Arc::new(FakeRouteMatrixClient::returning(vec![
        RouteLeg { distance_km: 1.0, time_minutes: 5.0 },
        RouteLeg { distance_km: 2.0, time_minutes: 7.0 },
    ]));
    let settings = spec_settings();

    let selector = Arc::new(CandidateSelector::new(driver_store, route_client, kv.clone(), settings.clone()));
    let orchestrator = DispatchOrchestrator::new(kv, bus.clone(), order_store.clone(), push.clone(), notifications.clone(), selector, settings);

    let order = instant_order(FleetTag::Wei);
    order_store.insert(&order).await.unwrap();
    let order_id = order.id.to_string();

    let bus_pub = bus.clone();
    tokio::spawn(async move {
        tokio::time::sleep(StdDuration::from_secs(6)).await;
        bus_pub
            .publish(
                DRIVER_STATUS_CHANGES_CHANNEL,
                serde_json::json!({
                    "driver_id": "D1",
                    "old_status": "idle",
                    "new_status": "enroute",
                    "order_id": serde_json::Value::Null,
                    "timestamp": Utc::now(),
                    "reason": "accepted another order",
                }),
            )
            .await
            .unwrap();
    });

    orchestrator.handle_order(order, CancellationToken::new()).await;

    let fresh = order_store.get(&order_id).await.unwrap().unwrap();
    assert_eq!(push.sent.lock().len(), 2, "D1 released the slot and D2 must have been tried next");
    assert_eq!(fresh.status, OrderStatus::Failed);
    assert!(notifications.failures.lock().iter().any(|(_, reason)| reason == "no acceptance"));
}

#[tokio::test]
async fn scenario_5_scheduled_to_instant_conversion_is_idempotent() {
    let order = scheduled_order(FleetTag::Rsk, chrono::Duration::minutes(19));
    let order_id = order.id.to_string();
    let concrete = InMemoryOrderStore::new();
    concrete.seed(order);
    let order_store: Arc<dyn OrderStore> = Arc::new(concrete);

    let queue = Arc::new(InMemoryQueue::new());
    let producer: Arc<dyn InstantOrderProducer> = queue.clone();
    let settings = Settings::default();
    let now = Utc::now();

    let first_tick = run_conversion_pass(&order_store, &producer, &settings, now).await;
    assert_eq!(first_tick, 1);

    let fresh = order_store.get(&order_id).await.unwrap().unwrap();
    assert_eq!(fresh.kind, shared::domain::OrderKind::Instant);
    assert_eq!(fresh.converted_from, Some(shared::domain::OrderKind::Scheduled));

    let second_tick = run_conversion_pass(&order_store, &producer, &settings, now + chrono::Duration::minutes(1)).await;
    assert_eq!(second_tick, 0, "already-converted order matches nothing on the next tick");
}

#[tokio::test(start_paused = true)]
async fn scenario_6_lost_dispatch_lock_stops_without_touching_order_state() {
    let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
    let order_store: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new());
    let settings = spec_settings();

    let mut order = instant_order(FleetTag::Wei);
    order_store.insert(&order).await.unwrap();
    let order_id = order.id.to_string();

    let lock = dispatch_lock(kv.clone(), &order_id, 30);
    let token = lock.acquire().await.unwrap().unwrap();

    // Simulate an external cleanup expiring the lock right before the
    // extension ticker's first tick (t_round/4).
    let kv_for_task = kv.clone();
    let key = lock.key().to_string();
    tokio::spawn(async move {
        tokio::time::sleep(StdDuration::from_millis(500)).await;
        kv_for_task.delete(&key).await.unwrap();
    });

    let notifications: Arc<dyn shared::ports::NotificationSink> = Arc::new(FakeNotificationSink::new());
    let outcome = wait_for_response(kv, bus, order_store.clone(), notifications, &mut order, "D1", 7.0, 3.0, &lock, &token, &settings, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, offer::WaitOutcome::Stop);
    let fresh = order_store.get(&order_id).await.unwrap().unwrap();
    assert_eq!(fresh.status, OrderStatus::Waiting, "no status mutation from a lost lock");
    assert!(!fresh.log.iter().any(|e| e.kind == shared::domain::OrderEventKind::DriverTimeout));
}
