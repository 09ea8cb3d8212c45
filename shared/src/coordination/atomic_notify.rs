//! The atomic-notify composite operation (spec §4.1): "(i) verifies the
//! order is still in status waiting, (ii) acquires the
//! driver-notification lock, (iii) returns a release function.
//! All-or-nothing; failures report a reason code."

use std::sync::Arc;

use crate::domain::OrderStatus;
use crate::error::DispatchError;
use crate::ports::OrderStore;

use super::kv::KvStore;
use super::locks::{driver_notification_lock, LockToken, NamedLock};

/// Held for the duration of one offer. Dropping without calling
/// [`NotifyGuard::release`] leaves the lock to expire on its own TTL
/// (spec §3: "all locks... have finite TTLs so that crashes self-heal"),
/// which is why release is a plain async method rather than relied on
/// via `Drop`.
pub struct NotifyGuard {
    lock: NamedLock,
    token: LockToken,
}

impl NotifyGuard {
    pub async fn release(&self) -> anyhow::Result<bool> {
        self.lock.release(&self.token).await
    }
}

pub async fn atomic_notify(
    kv: Arc<dyn KvStore>,
    order_store: &dyn OrderStore,
    order_id: &str,
    driver_id: &str,
    lock_ttl_secs: u64,
) -> Result<NotifyGuard, DispatchError> {
    let order = order_store
        .get(order_id)
        .await
        .map_err(|e| DispatchError::Store(e.to_string()))?
        .ok_or_else(|| DispatchError::OrderNotWaiting { order_id: order_id.to_string() })?;

    if order.status != OrderStatus::Waiting {
        return Err(DispatchError::OrderNotWaiting { order_id: order_id.to_string() });
    }

    let lock = driver_notification_lock(kv, driver_id, lock_ttl_secs);
    let token = lock
        .acquire()
        .await
        .map_err(|e| DispatchError::Coordination(e.to_string()))?
        .ok_or_else(|| DispatchError::DriverBusy { driver_id: driver_id.to_string() })?;

    Ok(NotifyGuard { lock, token })
}
