//! Conversion pass (spec §4.7 step 2): promote scheduled orders whose
//! pickup is imminent into instant orders and drop them back onto the
//! instant-order queue.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use shared::ports::{InstantOrderProducer, OrderStore};
use shared::Settings;

/// Converts scheduled orders within `settings.t_convert_mins` of pickup
/// that are still `waiting`, republishing each conversion onto the
/// instant-order queue. Returns the number of orders converted.
///
/// Conversion itself is idempotent (`OrderStore::try_convert_to_instant`
/// matches nothing once the first attempt has already flipped the
/// document), so a tick that races a retried tick never republishes
/// twice.
pub async fn run_conversion_pass(
    order_store: &Arc<dyn OrderStore>,
    queue: &Arc<dyn InstantOrderProducer>,
    settings: &Settings,
    now: DateTime<Utc>,
) -> usize {
    let orders = match order_store.find_ready_to_convert(Duration::minutes(settings.t_convert_mins), now).await {
        Ok(orders) => orders,
        Err(e) => {
            tracing::error!(error = %e, "find_ready_to_convert failed");
            return 0;
        }
    };

    let mut converted = 0;
    for order in orders {
        let order_id = order.id.to_string();
        match order_store.try_convert_to_instant(&order_id, now).await {
            Ok(true) => match order_store.get(&order_id).await {
                Ok(Some(fresh)) => match queue.publish(&fresh).await {
                    Ok(()) => converted += 1,
                    Err(e) => tracing::error!(order_id, error = %e, "failed to republish converted order"),
                },
                Ok(None) => tracing::warn!(order_id, "converted order vanished before republish"),
                Err(e) => tracing::error!(order_id, error = %e, "failed to re-read converted order"),
            },
            // spec §4.7: "on mismatch, skip silently" -- status or kind moved
            // on under us, or a concurrent tick already converted it.
            Ok(false) => {}
            Err(e) => tracing::error!(order_id, error = %e, "try_convert_to_instant failed"),
        }
    }
    converted
}
