//! In-memory stand-ins for the KV store and event bus, used by unit
//! tests throughout this crate and by the integration-tests crate.
//! TTLs are tracked but never actively swept; expiry is checked lazily
//! on read, which is sufficient for deterministic tests that don't
//! depend on real wall-clock expiry races.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use super::kv::KvStore;
use super::pubsub::{EventBus, Subscription};

struct Entry {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
pub struct InMemoryKvStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(entries: &HashMap<String, Entry>, key: &str) -> Option<String> {
        entries.get(key).filter(|e| e.expires_at > Instant::now()).map(|e| e.value.clone())
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock();
        if Self::live_value(&entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry { value: value.to_string(), expires_at: Instant::now() + Duration::from_secs(ttl_secs) },
        );
        Ok(true)
    }

    async fn compare_delete(&self, key: &str, expected: &str) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock();
        if Self::live_value(&entries, key).as_deref() == Some(expected) {
            entries.remove(key);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn compare_expire(&self, key: &str, expected: &str, ttl_secs: u64) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock();
        if Self::live_value(&entries, key).as_deref() == Some(expected) {
            entries.insert(
                key.to_string(),
                Entry { value: expected.to_string(), expires_at: Instant::now() + Duration::from_secs(ttl_secs) },
            );
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let entries = self.entries.lock();
        Ok(Self::live_value(&entries, key))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> anyhow::Result<()> {
        let mut entries = self.entries.lock();
        entries.insert(
            key.to_string(),
            Entry { value: value.to_string(), expires_at: Instant::now() + Duration::from_secs(ttl_secs) },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        let entries = self.entries.lock();
        Ok(Self::live_value(&entries, key).is_some())
    }
}

/// Backed by one `broadcast` channel per distinct channel name created so
/// far, so multiple subscribers to the same channel each see every
/// publish, matching real pub/sub fan-out.
#[derive(Default)]
pub struct InMemoryEventBus {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, channel: &str) -> broadcast::Sender<String> {
        let mut channels = self.channels.lock();
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, channel: &str, payload: serde_json::Value) -> anyhow::Result<()> {
        let sender = self.sender_for(channel);
        let _ = sender.send(serde_json::to_string(&payload)?);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> anyhow::Result<Subscription> {
        let sender = self.sender_for(channel);
        let mut broadcast_rx = sender.subscribe();
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            while let Ok(msg) = broadcast_rx.recv().await {
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::new(rx))
    }
}
