//! Capability traits for collaborators spec §1 treats as external: the
//! route-matrix service, the mobile-push provider, the notification
//! sink, the instant-order queue, and the document store.
//!
//! spec §9 calls out cyclic references between services as a
//! source-repo problem to be resolved "by stating capability sets: each
//! collaborator is referenced by its operations, not by a concrete
//! type" — these traits are that resolution. Production crates depend
//! on `Arc<dyn Trait>`; tests depend on the fakes in [`fake`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Driver, FleetTag, Order};

/// A single leg of the route-matrix response (spec §4.2 stage 3, §6).
#[derive(Debug, Clone, Copy)]
pub struct RouteLeg {
    pub distance_km: f64,
    pub time_minutes: f64,
}

/// `directions_matrix_inverse`: many origins, one destination (spec §6).
/// Implementations must preserve origin order in the result and may
/// return fewer legs than origins (spec §8: "candidates beyond the
/// returned length are dropped, not treated as zero-ETA").
#[async_trait]
pub trait RouteMatrixClient: Send + Sync {
    async fn directions_matrix_inverse(
        &self,
        origins: &[crate::domain::Coordinate],
        destination: crate::domain::Coordinate,
    ) -> anyhow::Result<Vec<RouteLeg>>;
}

#[derive(Debug, Clone)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
}

/// `push(token, data_map, notification)` (spec §6). Success only means
/// the provider accepted the request, not that the device received it.
#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn push(
        &self,
        token: &str,
        data: serde_json::Value,
        notification: PushNotification,
    ) -> anyhow::Result<()>;
}

/// Fire-and-forget notification collaborator (spec §6).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_order_failed(&self, order_id: &str, reason: &str);
    async fn notify_driver_timeout(&self, order_id: &str, driver_id: &str);
}

/// Producer side of the instant-order queue (spec §6): durable FIFO,
/// at-least-once delivery.
#[async_trait]
pub trait InstantOrderProducer: Send + Sync {
    async fn publish(&self, order: &Order) -> anyhow::Result<()>;
}

/// One delivered queue message, handed to the orchestrator for
/// deserialization (spec §4.5: invalid messages are logged and
/// discarded, never requeued).
pub struct QueueMessage {
    pub payload: Vec<u8>,
}

/// Consumer side of the instant-order queue.
#[async_trait]
pub trait InstantOrderConsumer: Send + Sync {
    async fn next(&self) -> anyhow::Result<Option<QueueMessage>>;
}

/// The document store's order-facing repository (spec §3 Ownership).
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, order_id: &str) -> anyhow::Result<Option<Order>>;
    async fn insert(&self, order: &Order) -> anyhow::Result<()>;
    async fn save(&self, order: &Order) -> anyhow::Result<()>;

    /// Scheduled orders in `scheduled_accepted`, pickup within `within` of
    /// `now`, with an assigned driver and `driver_notified = false`
    /// (spec §4.7 step 1).
    async fn find_needing_reminder(
        &self,
        within: chrono::Duration,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Order>>;

    /// Scheduled orders still `waiting`, pickup within `within` of `now`
    /// (spec §4.7 step 2).
    async fn find_ready_to_convert(
        &self,
        within: chrono::Duration,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Order>>;

    /// Conditional update: flips `kind` to `Instant` and sets
    /// `converted_from = Scheduled` only if status is still `Waiting` and
    /// kind is still `Scheduled`. Returns `true` iff the update applied —
    /// a retried conversion whose first attempt already succeeded matches
    /// nothing and returns `false` (spec §4.7, §8 idempotence law).
    async fn try_convert_to_instant(&self, order_id: &str, now: DateTime<Utc>) -> anyhow::Result<bool>;
}

/// The document store's driver-facing repository.
#[async_trait]
pub trait DriverStore: Send + Sync {
    async fn get(&self, driver_id: &str) -> anyhow::Result<Option<Driver>>;
    async fn save(&self, driver: &Driver) -> anyhow::Result<()>;

    /// Base eligibility pool for stage 1 of candidate selection (spec
    /// §4.2): `online ∧ active ∧ approved ∧ state = idle` for the given
    /// order fleet's compatible fleets, left to the caller to further
    /// filter (blacklist, busy probe, schedule hold, reject-list).
    async fn find_eligible(&self, order_fleet: FleetTag) -> anyhow::Result<Vec<Driver>>;
}

pub mod fake;
pub mod logging_defaults;
