//! Expiry-reminder pass (spec §4.7 step 1): nudge drivers holding a
//! scheduled pickup that's coming up soon.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use shared::domain::Order;
use shared::ports::{DriverStore, OrderStore, PushNotification, PushProvider};
use shared::Settings;

/// Sends a reminder push to each scheduled order's assigned driver,
/// bounded to `settings.reminder_concurrency` in-flight sends. Returns
/// the number of reminders actually delivered.
pub async fn run_reminder_pass(
    order_store: &Arc<dyn OrderStore>,
    driver_store: &Arc<dyn DriverStore>,
    push: &Arc<dyn PushProvider>,
    settings: &Settings,
    now: DateTime<Utc>,
) -> usize {
    let orders = match order_store.find_needing_reminder(Duration::minutes(settings.t_remind_mins), now).await {
        Ok(orders) => orders,
        Err(e) => {
            tracing::error!(error = %e, "find_needing_reminder failed");
            return 0;
        }
    };

    let sent = Arc::new(AtomicUsize::new(0));
    stream::iter(orders)
        .for_each_concurrent(Some(settings.reminder_concurrency), |order| {
            let order_store = order_store.clone();
            let driver_store = driver_store.clone();
            let push = push.clone();
            let sent = sent.clone();
            async move {
                if send_one_reminder(&order_store, &driver_store, &push, order, now).await {
                    sent.fetch_add(1, Ordering::Relaxed);
                }
            }
        })
        .await;

    sent.load(Ordering::Relaxed)
}

async fn send_one_reminder(
    order_store: &Arc<dyn OrderStore>,
    driver_store: &Arc<dyn DriverStore>,
    push: &Arc<dyn PushProvider>,
    mut order: Order,
    now: DateTime<Utc>,
) -> bool {
    let Some(driver_id) = order.assigned_driver.clone() else {
        return false;
    };

    let driver = match driver_store.get(&driver_id).await {
        Ok(Some(driver)) => driver,
        Ok(None) => {
            tracing::warn!(order_id = %order.id, driver_id, "reminder target driver not found");
            return false;
        }
        Err(e) => {
            tracing::error!(order_id = %order.id, driver_id, error = %e, "driver lookup failed");
            return false;
        }
    };

    let Some(token) = driver.push_token.as_deref() else {
        return false;
    };

    let result = push
        .push(
            token,
            serde_json::json!({ "order_id": order.id.to_string(), "pickup": order.pickup.resolved_address }),
            PushNotification {
                title: "Upcoming scheduled pickup".to_string(),
                body: format!("Pickup at {} coming up", order.pickup.resolved_address),
            },
        )
        .await;

    if let Err(e) = result {
        tracing::warn!(order_id = %order.id, driver_id, error = %e, "reminder push failed, will retry next tick");
        return false;
    }

    order.driver_notified = true;
    order.updated_at = now;
    if let Err(e) = order_store.save(&order).await {
        tracing::error!(order_id = %order.id, error = %e, "failed to persist driver_notified");
        return false;
    }

    true
}
