//! Driver-level timeout handling (spec §4.3): reject-lock guarded
//! blacklist bookkeeping and log entry, run once per (order, driver,
//! round) no matter how many racing paths observe the timeout.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::coordination::locks::reject_lock;
use shared::coordination::notifying_order::add_to_blacklist;
use shared::coordination::KvStore;
use shared::domain::{Order, OrderEventKind, OrderLogEntry};
use shared::ports::NotificationSink;

/// TTL for the reject lock guarding timeout bookkeeping (spec §6).
const REJECT_LOCK_TTL_SECS: u64 = 10;

/// (i) acquires a short-TTL reject lock; if already held, another path
/// is handling this timeout and nothing further happens here. (ii)-(iv)
/// otherwise: blacklist, log, release.
#[allow(clippy::too_many_arguments)]
pub async fn handle_driver_timeout(
    kv: &Arc<dyn KvStore>,
    notifications: &Arc<dyn NotificationSink>,
    order: &mut Order,
    driver_id: &str,
    round: u32,
    eta_minutes: f64,
    distance_km: f64,
    blacklist_enabled: bool,
    blacklist_ttl_secs: u64,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let lock = reject_lock(kv.clone(), &order.id.to_string(), driver_id, REJECT_LOCK_TTL_SECS);
    let token = match lock.acquire().await? {
        Some(t) => t,
        None => return Ok(()),
    };

    if blacklist_enabled {
        add_to_blacklist(kv, driver_id, &order.pickup.resolved_address, blacklist_ttl_secs).await?;
    }

    order.record_event(OrderLogEntry {
        kind: OrderEventKind::DriverTimeout,
        driver_id: Some(driver_id.to_string()),
        round,
        at: now,
        detail: Some(serde_json::json!({ "eta_minutes": eta_minutes, "distance_km": distance_km })),
    });

    notifications.notify_driver_timeout(&order.id.to_string(), driver_id).await;

    lock.release(&token).await?;
    Ok(())
}
