//! In-memory stand-ins for the `ports` traits.
//!
//! Mirrors the teacher's habit of backing its services with `DashMap`
//! instead of a real database (`services/orders/src/service.rs`'s
//! `OrderService`) — here used deliberately as test doubles rather than
//! as the production store, since the real stores are Postgres/NATS.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::domain::{Driver, FleetTag, Order, OrderKind, OrderStatus};

use super::{
    InstantOrderConsumer, InstantOrderProducer, NotificationSink, PushNotification, PushProvider,
    QueueMessage, RouteLeg, RouteMatrixClient,
};

#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<String, Order>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, order: Order) {
        self.orders.insert(order.id.to_string(), order);
    }
}

#[async_trait]
impl super::OrderStore for InMemoryOrderStore {
    async fn get(&self, order_id: &str) -> anyhow::Result<Option<Order>> {
        Ok(self.orders.get(order_id).map(|r| r.clone()))
    }

    async fn insert(&self, order: &Order) -> anyhow::Result<()> {
        self.orders.insert(order.id.to_string(), order.clone());
        Ok(())
    }

    async fn save(&self, order: &Order) -> anyhow::Result<()> {
        self.orders.insert(order.id.to_string(), order.clone());
        Ok(())
    }

    async fn find_needing_reminder(
        &self,
        within: chrono::Duration,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Order>> {
        Ok(self
            .orders
            .iter()
            .filter(|e| {
                let o = e.value();
                o.status == OrderStatus::ScheduledAccepted
                    && !o.driver_notified
                    && o.assigned_driver.is_some()
                    && o.scheduled_pickup_at
                        .map(|at| at - now <= within && at >= now)
                        .unwrap_or(false)
            })
            .map(|e| e.value().clone())
            .collect())
    }

    async fn find_ready_to_convert(
        &self,
        within: chrono::Duration,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Order>> {
        Ok(self
            .orders
            .iter()
            .filter(|e| {
                let o = e.value();
                o.status == OrderStatus::Waiting
                    && o.kind == OrderKind::Scheduled
                    && o.scheduled_pickup_at
                        .map(|at| at - now <= within && at >= now)
                        .unwrap_or(false)
            })
            .map(|e| e.value().clone())
            .collect())
    }

    async fn try_convert_to_instant(&self, order_id: &str, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let mut entry = match self.orders.get_mut(order_id) {
            Some(e) => e,
            None => return Ok(false),
        };
        if entry.status != OrderStatus::Waiting || entry.kind != OrderKind::Scheduled {
            return Ok(false);
        }
        entry.kind = OrderKind::Instant;
        entry.converted_from = Some(OrderKind::Scheduled);
        entry.updated_at = now;
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemoryDriverStore {
    drivers: DashMap<String, Driver>,
}

impl InMemoryDriverStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, driver: Driver) {
        self.drivers.insert(driver.id.clone(), driver);
    }
}

#[async_trait]
impl super::DriverStore for InMemoryDriverStore {
    async fn get(&self, driver_id: &str) -> anyhow::Result<Option<Driver>> {
        Ok(self.drivers.get(driver_id).map(|r| r.clone()))
    }

    async fn save(&self, driver: &Driver) -> anyhow::Result<()> {
        self.drivers.insert(driver.id.clone(), driver.clone());
        Ok(())
    }

    async fn find_eligible(&self, order_fleet: FleetTag) -> anyhow::Result<Vec<Driver>> {
        Ok(self
            .drivers
            .iter()
            .filter(|e| e.value().is_eligible_base() && e.value().fleet.may_serve(order_fleet))
            .map(|e| e.value().clone())
            .collect())
    }
}

/// Scripted route-matrix responses, keyed by call order. Returns
/// `Err` once `fail_after` calls have been made, to exercise spec §4.2's
/// "the whole selection fails" path.
pub struct FakeRouteMatrixClient {
    responses: Mutex<Vec<Vec<RouteLeg>>>,
    fail: bool,
}

impl FakeRouteMatrixClient {
    pub fn returning(legs: Vec<RouteLeg>) -> Self {
        Self { responses: Mutex::new(vec![legs]), fail: false }
    }

    pub fn failing() -> Self {
        Self { responses: Mutex::new(Vec::new()), fail: true }
    }
}

#[async_trait]
impl RouteMatrixClient for FakeRouteMatrixClient {
    async fn directions_matrix_inverse(
        &self,
        origins: &[crate::domain::Coordinate],
        _destination: crate::domain::Coordinate,
    ) -> anyhow::Result<Vec<RouteLeg>> {
        if self.fail {
            anyhow::bail!("route matrix unavailable");
        }
        let mut responses = self.responses.lock();
        let legs = responses.pop().unwrap_or_default();
        Ok(legs.into_iter().take(origins.len()).collect())
    }
}

#[derive(Default)]
pub struct FakePushProvider {
    pub sent: Mutex<Vec<(String, serde_json::Value)>>,
    fail_tokens: Mutex<Vec<String>>,
}

impl FakePushProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, token: &str) {
        self.fail_tokens.lock().push(token.to_string());
    }
}

#[async_trait]
impl PushProvider for FakePushProvider {
    async fn push(
        &self,
        token: &str,
        data: serde_json::Value,
        _notification: PushNotification,
    ) -> anyhow::Result<()> {
        if self.fail_tokens.lock().iter().any(|t| t == token) {
            anyhow::bail!("push provider rejected token {token}");
        }
        self.sent.lock().push((token.to_string(), data));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeNotificationSink {
    pub failures: Mutex<Vec<(String, String)>>,
    pub timeouts: Mutex<Vec<(String, String)>>,
}

impl FakeNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationSink for FakeNotificationSink {
    async fn notify_order_failed(&self, order_id: &str, reason: &str) {
        self.failures.lock().push((order_id.to_string(), reason.to_string()));
    }

    async fn notify_driver_timeout(&self, order_id: &str, driver_id: &str) {
        self.timeouts.lock().push((order_id.to_string(), driver_id.to_string()));
    }
}

/// An in-process stand-in for the durable instant-order queue, backed by
/// an unbounded `tokio::mpsc` channel.
pub struct InMemoryQueue {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Arc::new(tokio::sync::Mutex::new(rx)) }
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstantOrderProducer for InMemoryQueue {
    async fn publish(&self, order: &Order) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(order)?;
        self.tx.send(payload).map_err(|e| anyhow::anyhow!("queue closed: {e}"))
    }
}

#[async_trait]
impl InstantOrderConsumer for InMemoryQueue {
    async fn next(&self) -> anyhow::Result<Option<QueueMessage>> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await.map(|payload| QueueMessage { payload }))
    }
}
