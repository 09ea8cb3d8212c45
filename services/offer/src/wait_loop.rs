//! The wait loop (spec §4.4): the event race at the heart of one offer.
//! Pre-conditions: dispatch lock held, driver-notification lock held,
//! notifying-order recorded. This function owns none of those — it only
//! extends the dispatch lock on its ticker and reads/decides.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shared::coordination::locks::{LockToken, NamedLock};
use shared::coordination::pubsub::{
    order_response_channel, DriverStatusChangeEvent, EventBus, OfferAction, OrderEventType,
    OrderStatusChangeEvent, Subscription, DRIVER_STATUS_CHANGES_CHANNEL, ORDER_STATUS_CHANGES_CHANNEL,
};
use shared::coordination::KvStore;
use shared::domain::{Order, OrderStatus};
use shared::ports::{NotificationSink, OrderStore};
use shared::Settings;
use tokio_util::sync::CancellationToken;

use crate::timeout::handle_driver_timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// `(true, false)`: an accept terminates the whole dispatch.
    Accepted,
    /// `(false, true)`: this driver is done, try the next candidate.
    TryNext,
    /// `(false, false)`: dispatch as a whole must stop.
    Stop,
}

fn poll_result(status: OrderStatus, assigned_driver: &Option<String>, driver_id: &str) -> WaitOutcome {
    if status == OrderStatus::Enroute && assigned_driver.as_deref() == Some(driver_id) {
        WaitOutcome::Accepted
    } else {
        WaitOutcome::Stop
    }
}

async fn recv_opt(sub: &mut Option<Subscription>) -> Option<String> {
    match sub {
        Some(s) => s.recv().await,
        None => std::future::pending().await,
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn wait_for_response(
    kv: Arc<dyn KvStore>,
    event_bus: Arc<dyn EventBus>,
    order_store: Arc<dyn OrderStore>,
    notifications: Arc<dyn NotificationSink>,
    order: &mut Order,
    driver_id: &str,
    eta_minutes: f64,
    distance_km: f64,
    dispatch_lock: &NamedLock,
    dispatch_lock_token: &LockToken,
    settings: &Settings,
    cancellation: CancellationToken,
) -> anyhow::Result<WaitOutcome> {
    let order_id = order.id.to_string();

    let order_response_sub = event_bus.subscribe(&order_response_channel(&order_id)).await.ok();
    let driver_status_sub = event_bus.subscribe(DRIVER_STATUS_CHANGES_CHANNEL).await.ok();
    let order_status_sub = event_bus.subscribe(ORDER_STATUS_CHANGES_CHANNEL).await.ok();

    if order_response_sub.is_none() || driver_status_sub.is_none() || order_status_sub.is_none() {
        return degraded_wait(kv, order_store, notifications, order, driver_id, eta_minutes, distance_km, settings, cancellation).await;
    }

    let mut order_response_sub = order_response_sub;
    let mut driver_status_sub = driver_status_sub;
    let mut order_status_sub = order_status_sub;

    let timeout_timer = tokio::time::sleep(settings.t_round());
    tokio::pin!(timeout_timer);

    let mut extension_ticker = tokio::time::interval(settings.t_round() / 4);
    extension_ticker.tick().await; // consume the immediate first tick

    let mut poll_ticker = tokio::time::interval(Duration::from_secs(1));
    poll_ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = cancellation.cancelled() => {
                return Ok(WaitOutcome::Stop);
            }

            () = &mut timeout_timer => {
                handle_driver_timeout(
                    &kv,
                    &notifications,
                    order,
                    driver_id,
                    order.rounds,
                    eta_minutes,
                    distance_km,
                    settings.blacklist_enabled,
                    settings.blacklist_ttl_secs,
                    Utc::now(),
                ).await?;
                return Ok(WaitOutcome::TryNext);
            }

            _ = extension_ticker.tick() => {
                if !dispatch_lock.extend(dispatch_lock_token).await? {
                    return Ok(WaitOutcome::Stop);
                }
            }

            _ = poll_ticker.tick() => {
                if let Some(fresh) = order_store.get(&order_id).await? {
                    if fresh.status != OrderStatus::Waiting {
                        return Ok(poll_result(fresh.status, &fresh.assigned_driver, driver_id));
                    }
                }
            }

            msg = recv_opt(&mut order_response_sub) => {
                let Some(raw) = msg else { continue };
                let Ok(event) = serde_json::from_str::<shared::coordination::pubsub::OrderResponseEvent>(&raw) else {
                    tracing::warn!(%order_id, "ignoring malformed order_response payload");
                    continue;
                };
                match event.action {
                    OfferAction::Accept => return Ok(WaitOutcome::Accepted),
                    OfferAction::Reject if event.driver_id == driver_id => return Ok(WaitOutcome::TryNext),
                    OfferAction::Reject => {}
                }
            }

            msg = recv_opt(&mut driver_status_sub) => {
                let Some(raw) = msg else { continue };
                let Ok(event) = serde_json::from_str::<DriverStatusChangeEvent>(&raw) else {
                    tracing::warn!(%order_id, "ignoring malformed driver_status_changes payload");
                    continue;
                };
                if event.driver_id == driver_id && event.new_status != "idle" {
                    return Ok(WaitOutcome::TryNext);
                }
            }

            msg = recv_opt(&mut order_status_sub) => {
                let Some(raw) = msg else { continue };
                let Ok(event) = serde_json::from_str::<OrderStatusChangeEvent>(&raw) else {
                    tracing::warn!(%order_id, "ignoring malformed order_status_changes payload");
                    continue;
                };
                if event.order_id != order_id {
                    continue;
                }
                if event.event_type == OrderEventType::Accepted {
                    return Ok(WaitOutcome::Accepted);
                }
                if event.new_status != "waiting" {
                    return Ok(WaitOutcome::Stop);
                }
            }
        }
    }
}

/// spec §4.4: "If the coordination service is unavailable, a degraded
/// mode is used: sleep exactly T_round, then re-read order state once;
/// treat anything not-waiting as the result."
#[allow(clippy::too_many_arguments)]
async fn degraded_wait(
    kv: Arc<dyn KvStore>,
    order_store: Arc<dyn OrderStore>,
    notifications: Arc<dyn NotificationSink>,
    order: &mut Order,
    driver_id: &str,
    eta_minutes: f64,
    distance_km: f64,
    settings: &Settings,
    cancellation: CancellationToken,
) -> anyhow::Result<WaitOutcome> {
    tokio::select! {
        _ = cancellation.cancelled() => return Ok(WaitOutcome::Stop),
        _ = tokio::time::sleep(settings.t_round()) => {}
    }

    let order_id = order.id.to_string();
    match order_store.get(&order_id).await? {
        Some(fresh) if fresh.status != OrderStatus::Waiting => {
            Ok(poll_result(fresh.status, &fresh.assigned_driver, driver_id))
        }
        _ => {
            handle_driver_timeout(
                &kv,
                &notifications,
                order,
                driver_id,
                order.rounds,
                eta_minutes,
                distance_km,
                settings.blacklist_enabled,
                settings.blacklist_ttl_secs,
                Utc::now(),
            )
            .await?;
            Ok(WaitOutcome::TryNext)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use shared::coordination::fake::{InMemoryEventBus, InMemoryKvStore};
    use shared::coordination::pubsub::order_response_channel;
    use shared::domain::{Coordinate, CreatorMeta, FleetTag, Location, OrderKind, OrderStatus};
    use shared::ports::fake::{FakeNotificationSink, InMemoryOrderStore};
    use shared::ports::OrderStore;
    use uuid::Uuid;

    use super::*;

    fn settings_fast() -> Settings {
        let mut s = Settings::default();
        s.t_round_secs = 2;
        s
    }

    fn waiting_order() -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            short_id: "O1".into(),
            kind: OrderKind::Instant,
            status: OrderStatus::Waiting,
            fleet: FleetTag::Rsk,
            pickup: Location { input_text: "x".into(), resolved_address: "123 Main St".into(), coord: Some(Coordinate::new(25.0, 121.5)) },
            destination: None,
            remarks: None,
            scheduled_pickup_at: None,
            rounds: 0,
            assigned_driver: None,
            log: Vec::new(),
            creator: CreatorMeta { source: "test".into(), created_by: "test".into() },
            created_at: now,
            updated_at: now,
            driver_notified: false,
            converted_from: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn accept_event_for_current_driver_wins() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
        let store = Arc::new(InMemoryOrderStore::new());
        let notifications: Arc<dyn NotificationSink> = Arc::new(FakeNotificationSink::new());
        let settings = settings_fast();

        let mut order = waiting_order();
        store.insert(&order).await.unwrap();

        let lock = shared::coordination::dispatch_lock(kv.clone(), &order.id.to_string(), 30);
        let token = lock.acquire().await.unwrap().unwrap();

        let bus_pub = bus.clone();
        let order_id = order.id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            bus_pub
                .publish(
                    &order_response_channel(&order_id),
                    serde_json::json!({
                        "order_id": order_id,
                        "driver_id": "D1",
                        "action": "accept",
                        "timestamp": Utc::now(),
                    }),
                )
                .await
                .unwrap();
        });

        let outcome = wait_for_response(
            kv,
            bus,
            store,
            notifications,
            &mut order,
            "D1",
            7.0,
            3.0,
            &lock,
            &token,
            &settings,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, WaitOutcome::Accepted);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fires_and_blacklists() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
        let store = Arc::new(InMemoryOrderStore::new());
        let sink = Arc::new(FakeNotificationSink::new());
        let notifications: Arc<dyn NotificationSink> = sink.clone();
        let settings = settings_fast();

        let mut order = waiting_order();
        store.insert(&order).await.unwrap();

        let lock = shared::coordination::dispatch_lock(kv.clone(), &order.id.to_string(), 30);
        let token = lock.acquire().await.unwrap().unwrap();

        let outcome = wait_for_response(
            kv.clone(),
            bus,
            store,
            notifications,
            &mut order,
            "D1",
            7.0,
            3.0,
            &lock,
            &token,
            &settings,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, WaitOutcome::TryNext);
        assert!(shared::coordination::notifying_order::is_blacklisted(&kv, "D1", "123 Main St").await.unwrap());
        assert_eq!(sink.timeouts.lock().len(), 1, "the notification sink must be told about the timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_dispatch() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
        let store = Arc::new(InMemoryOrderStore::new());
        let notifications: Arc<dyn NotificationSink> = Arc::new(FakeNotificationSink::new());
        let settings = settings_fast();

        let mut order = waiting_order();
        store.insert(&order).await.unwrap();

        let lock = shared::coordination::dispatch_lock(kv.clone(), &order.id.to_string(), 30);
        let token = lock.acquire().await.unwrap().unwrap();

        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let outcome = wait_for_response(
            kv,
            bus,
            store,
            notifications,
            &mut order,
            "D1",
            7.0,
            3.0,
            &lock,
            &token,
            &settings,
            cancellation,
        )
        .await
        .unwrap();

        assert_eq!(outcome, WaitOutcome::Stop);
    }
}
