//! The three named locks of spec §4.1, each a thin wrapper over
//! [`KvStore::set_if_absent`]/[`KvStore::compare_delete`]/
//! [`KvStore::compare_expire`] with a key-naming convention matching
//! spec §6's KV layout table.

use std::sync::Arc;

use uuid::Uuid;

use super::kv::KvStore;

/// The token returned on acquisition. Extension and release both require
/// presenting it back, so a lock holder cannot be confused with a
/// different holder that raced in after a TTL expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(pub String);

impl LockToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// A single named lock instance: one key, one TTL policy.
pub struct NamedLock {
    kv: Arc<dyn KvStore>,
    key: String,
    ttl_secs: u64,
}

impl NamedLock {
    pub fn new(kv: Arc<dyn KvStore>, key: String, ttl_secs: u64) -> Self {
        Self { kv, key, ttl_secs }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Attempt acquisition. `None` means the lock is currently held by
    /// someone else.
    pub async fn acquire(&self) -> anyhow::Result<Option<LockToken>> {
        let token = LockToken::generate();
        let acquired = self.kv.set_if_absent(&self.key, &token.0, self.ttl_secs).await?;
        Ok(if acquired { Some(token) } else { None })
    }

    /// Release, but only if `token` still matches what is stored — a
    /// lock whose TTL already expired and was re-acquired by someone
    /// else must not be torn down by the original holder's late release.
    pub async fn release(&self, token: &LockToken) -> anyhow::Result<bool> {
        self.kv.compare_delete(&self.key, &token.0).await
    }

    /// Reset the TTL, again gated on `token` still matching. Used by the
    /// dispatch-lock-extension ticker (spec §4.4).
    pub async fn extend(&self, token: &LockToken) -> anyhow::Result<bool> {
        self.kv.compare_expire(&self.key, &token.0, self.ttl_secs).await
    }

    /// A short-TTL probe that acquires and immediately releases, used by
    /// stage 1(b) of candidate selection to test whether a driver is
    /// currently being offered something without actually claiming the
    /// lock for this caller.
    pub async fn probe_busy(&self) -> anyhow::Result<bool> {
        match self.acquire().await? {
            Some(token) => {
                self.release(&token).await?;
                Ok(false)
            }
            None => Ok(true),
        }
    }
}

pub fn dispatch_lock(kv: Arc<dyn KvStore>, order_id: &str, ttl_secs: u64) -> NamedLock {
    NamedLock::new(kv, format!("dispatch_lock:{order_id}"), ttl_secs)
}

pub fn driver_notification_lock(kv: Arc<dyn KvStore>, driver_id: &str, ttl_secs: u64) -> NamedLock {
    NamedLock::new(kv, format!("driver_notification_lock:{driver_id}"), ttl_secs)
}

pub fn reject_lock(kv: Arc<dyn KvStore>, order_id: &str, driver_id: &str, ttl_secs: u64) -> NamedLock {
    NamedLock::new(kv, format!("order_reject_lock:{order_id}:{driver_id}"), ttl_secs)
}
