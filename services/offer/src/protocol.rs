//! The offer protocol (component C, spec §4.3): iterates ranked
//! candidates for one order, running atomic-notify, push, the wait
//! loop, and release around each.

use std::sync::Arc;

use chrono::Utc;
use selector::RankedCandidate;
use shared::coordination::pubsub::EventBus;
use shared::coordination::{atomic_notify, dispatch_lock, KvStore, LockToken, NamedLock};
use shared::domain::{Order, OrderEventKind, OrderLogEntry, OrderStatus};
use shared::error::DispatchError;
use shared::ports::{NotificationSink, OrderStore, PushNotification, PushProvider};
use shared::Settings;
use tokio_util::sync::CancellationToken;

use crate::payload::build_offer_payload;
use crate::wait_loop::{wait_for_response, WaitOutcome};

/// What happened after offering an order to its full candidate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A driver accepted; the order is now `enroute`.
    Accepted,
    /// The candidate list was exhausted with no acceptance.
    Exhausted,
    /// The order left `waiting` for a reason unrelated to this
    /// dispatch's own offers (cancelled by another path, lock lost,
    /// cancellation signal).
    StoppedExternally,
}

#[allow(clippy::too_many_arguments)]
pub async fn offer_to_candidates(
    kv: Arc<dyn KvStore>,
    event_bus: Arc<dyn EventBus>,
    order_store: Arc<dyn OrderStore>,
    push: Arc<dyn PushProvider>,
    notifications: Arc<dyn NotificationSink>,
    order: &mut Order,
    candidates: &[RankedCandidate],
    dispatch_lock_handle: &NamedLock,
    dispatch_lock_token: &LockToken,
    settings: &Settings,
    cancellation: CancellationToken,
) -> Result<DispatchOutcome, DispatchError> {
    for (index, candidate) in candidates.iter().enumerate() {
        if cancellation.is_cancelled() {
            return Ok(DispatchOutcome::StoppedExternally);
        }

        // Step 1: re-check order status.
        let fresh = order_store
            .get(&order.id.to_string())
            .await
            .map_err(|e| DispatchError::Store(e.to_string()))?;
        match fresh {
            Some(o) if o.status == OrderStatus::Waiting => {}
            Some(_) => return Ok(DispatchOutcome::StoppedExternally),
            None => return Ok(DispatchOutcome::StoppedExternally),
        }

        let driver_id = candidate.driver.id.clone();

        // Step 2: atomic notify.
        let guard = match atomic_notify(kv.clone(), order_store.as_ref(), &order.id.to_string(), &driver_id, settings.t_round_secs + 5).await {
            Ok(guard) => guard,
            Err(DispatchError::DriverBusy { .. }) | Err(DispatchError::OrderNotWaiting { .. }) => continue,
            Err(e) => return Err(e),
        };

        // Step 3: build payload.
        let payload = build_offer_payload(order, candidate, index, settings);

        // Step 4: push.
        let push_result = push
            .push(
                candidate.driver.push_token.as_deref().unwrap_or_default(),
                serde_json::to_value(&payload).unwrap_or(serde_json::Value::Null),
                PushNotification {
                    title: "New ride request".to_string(),
                    body: format!("{} away", payload.distance_km),
                },
            )
            .await;

        if push_result.is_err() {
            let _ = guard.release().await;
            continue;
        }

        // Step 5: record notifying-order entry.
        shared::coordination::notifying_order::set_notifying_order(
            &kv,
            &shared::coordination::notifying_order::NotifyingOrderRecord {
                order_id: order.id.to_string(),
                driver_id: driver_id.clone(),
                pushed_at: Utc::now(),
                timeout_secs: settings.t_round_secs,
            },
        )
        .await
        .map_err(|e| DispatchError::Coordination(e.to_string()))?;

        order.record_event(OrderLogEntry {
            kind: OrderEventKind::DriverNotified,
            driver_id: Some(driver_id.clone()),
            round: order.rounds,
            at: Utc::now(),
            detail: None,
        });

        // Step 6: wait loop.
        let outcome = wait_for_response(
            kv.clone(),
            event_bus.clone(),
            order_store.clone(),
            notifications.clone(),
            order,
            &driver_id,
            payload.eta_minutes,
            payload.distance_km,
            dispatch_lock_handle,
            dispatch_lock_token,
            settings,
            cancellation.clone(),
        )
        .await
        .map_err(|e| DispatchError::Coordination(e.to_string()))?;

        // Step 7: release the driver-notification lock and clear the
        // notifying-order record regardless of outcome.
        let _ = guard.release().await;
        let _ = shared::coordination::notifying_order::clear_notifying_order(&kv, &driver_id).await;

        // Step 8: decide.
        match outcome {
            WaitOutcome::Accepted => {
                order.record_event(OrderLogEntry {
                    kind: OrderEventKind::DriverAccept,
                    driver_id: Some(driver_id.clone()),
                    round: order.rounds,
                    at: Utc::now(),
                    detail: None,
                });
                order.assigned_driver = Some(driver_id);
                order
                    .transition(OrderStatus::Enroute, Utc::now())
                    .map_err(|e| DispatchError::Store(e.to_string()))?;
                return Ok(DispatchOutcome::Accepted);
            }
            WaitOutcome::Stop => return Ok(DispatchOutcome::StoppedExternally),
            WaitOutcome::TryNext => continue,
        }
    }

    Ok(DispatchOutcome::Exhausted)
}
