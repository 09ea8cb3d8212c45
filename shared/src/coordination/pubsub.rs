//! Event channels (spec §4.1, §6). Publication is fire-and-forget;
//! subscribers must tolerate gaps, which is why the wait loop (§4.4)
//! treats every subscription here as an accelerator over a periodic
//! store poll rather than as the source of truth.
//!
//! Grounded on the teacher's `shared/src/nats.rs` wrapper shape (a
//! thin struct around a connection with typed publish/subscribe
//! methods), adapted to Redis pub/sub since this is the KV-store's
//! channel facility, not the durable queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferAction {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponseEvent {
    pub order_id: String,
    pub driver_id: String,
    pub action: OfferAction,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverStatusChangeEvent {
    pub driver_id: String,
    pub old_status: String,
    pub new_status: String,
    #[serde(default)]
    pub order_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventType {
    StatusChange,
    Accepted,
    Failed,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusChangeEvent {
    pub order_id: String,
    pub old_status: String,
    pub new_status: String,
    #[serde(default)]
    pub driver_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub event_type: OrderEventType,
}

pub fn order_response_channel(order_id: &str) -> String {
    format!("order_response:{order_id}")
}

pub const DRIVER_STATUS_CHANGES_CHANNEL: &str = "driver_status_changes";
pub const ORDER_STATUS_CHANGES_CHANNEL: &str = "order_status_changes";

/// A raw channel subscription: the receiving half of a best-effort
/// fan-out. Payloads are opaque JSON text; callers deserialize into the
/// event type they expect and log-and-ignore anything that doesn't fit
/// (spec §4.4: "ambiguous payloads are logged and ignored").
pub struct Subscription {
    rx: mpsc::Receiver<String>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }

    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, channel: &str, payload: serde_json::Value) -> anyhow::Result<()>;

    async fn subscribe(&self, channel: &str) -> anyhow::Result<Subscription>;
}

/// Production implementation over `redis`'s pub/sub connection. Each
/// subscription opens its own dedicated connection (Redis pub/sub
/// connections cannot multiplex arbitrary commands) and forwards
/// messages into an mpsc channel so callers get a uniform `Subscription`
/// regardless of transport.
pub struct RedisEventBus {
    client: redis::Client,
}

impl RedisEventBus {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, channel: &str, payload: serde_json::Value) -> anyhow::Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let body = serde_json::to_string(&payload)?;
        redis::AsyncCommands::publish(&mut conn, channel, body).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> anyhow::Result<Subscription> {
        let conn = self.client.get_async_pubsub().await?;
        let (tx, rx) = mpsc::channel(64);
        let channel = channel.to_string();

        tokio::spawn(async move {
            let mut pubsub = conn;
            if pubsub.subscribe(&channel).await.is_err() {
                return;
            }
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::new(rx))
    }
}
