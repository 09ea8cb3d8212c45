//! Notifying-order records and blacklist entries (spec §3, §6): two
//! ephemeral KV-store-owned records with no compare-and-swap
//! requirement, unlike the named locks in [`super::locks`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::kv::KvStore;

/// The in-flight offer recorded against a driver for the duration of
/// one offer (spec §3): "the order currently being offered to that
/// driver, its push time, and a timeout seconds budget."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyingOrderRecord {
    pub order_id: String,
    pub driver_id: String,
    pub pushed_at: DateTime<Utc>,
    pub timeout_secs: u64,
}

fn notifying_order_key(driver_id: &str) -> String {
    format!("notifying_order:{driver_id}")
}

/// TTL = timeout + 5s grace (spec §6).
const NOTIFYING_ORDER_GRACE_SECS: u64 = 5;

pub async fn set_notifying_order(
    kv: &Arc<dyn KvStore>,
    record: &NotifyingOrderRecord,
) -> anyhow::Result<()> {
    let key = notifying_order_key(&record.driver_id);
    let body = serde_json::to_string(record)?;
    kv.set_ex(&key, &body, record.timeout_secs + NOTIFYING_ORDER_GRACE_SECS).await
}

pub async fn get_notifying_order(
    kv: &Arc<dyn KvStore>,
    driver_id: &str,
) -> anyhow::Result<Option<NotifyingOrderRecord>> {
    let key = notifying_order_key(driver_id);
    match kv.get(&key).await? {
        Some(body) => Ok(Some(serde_json::from_str(&body)?)),
        None => Ok(None),
    }
}

pub async fn clear_notifying_order(kv: &Arc<dyn KvStore>, driver_id: &str) -> anyhow::Result<()> {
    kv.delete(&notifying_order_key(driver_id)).await
}

fn blacklist_key(driver_id: &str, pickup_address: &str) -> String {
    format!("driver_blacklist:{driver_id}:{pickup_address}")
}

/// Presence-only; the value carries no information beyond existing.
pub async fn add_to_blacklist(
    kv: &Arc<dyn KvStore>,
    driver_id: &str,
    pickup_address: &str,
    ttl_secs: u64,
) -> anyhow::Result<()> {
    kv.set_ex(&blacklist_key(driver_id, pickup_address), "1", ttl_secs).await
}

pub async fn is_blacklisted(
    kv: &Arc<dyn KvStore>,
    driver_id: &str,
    pickup_address: &str,
) -> anyhow::Result<bool> {
    kv.exists(&blacklist_key(driver_id, pickup_address)).await
}
