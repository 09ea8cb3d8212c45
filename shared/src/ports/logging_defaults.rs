//! Default adapters for the collaborators spec §1 puts out of scope
//! (route-matrix, mobile push, notifications): these are owned by other
//! services in the platform this core is meant to run inside. A real
//! deployment supplies its own `RouteMatrixClient`/`PushProvider`/
//! `NotificationSink` wired to those services; what's here exists so
//! the dispatcher and converter binaries have something to construct
//! out of the box.

use async_trait::async_trait;

use crate::domain::Coordinate;

use super::{NotificationSink, PushNotification, PushProvider, RouteLeg, RouteMatrixClient};

/// There is no sensible default route-matrix answer — every call fails
/// loudly until a real client is wired in, which surfaces as a
/// `RouteMatrix` error and fails the dispatch attempt per spec §7,
/// rather than silently ranking candidates by nothing.
pub struct UnconfiguredRouteMatrixClient;

#[async_trait]
impl RouteMatrixClient for UnconfiguredRouteMatrixClient {
    async fn directions_matrix_inverse(
        &self,
        _origins: &[Coordinate],
        _destination: Coordinate,
    ) -> anyhow::Result<Vec<RouteLeg>> {
        anyhow::bail!("no route-matrix client configured")
    }
}

/// Logs the push instead of delivering it. Useful for local development
/// and for environments where the mobile-push integration is handled by
/// a sidecar that tails structured logs.
pub struct LoggingPushProvider;

#[async_trait]
impl PushProvider for LoggingPushProvider {
    async fn push(&self, token: &str, data: serde_json::Value, notification: PushNotification) -> anyhow::Result<()> {
        tracing::info!(push_token = token, title = %notification.title, body = %notification.body, data = %data, "push (logging provider, not delivered)");
        Ok(())
    }
}

pub struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn notify_order_failed(&self, order_id: &str, reason: &str) {
        tracing::warn!(order_id, reason, "order failed (logging notification sink)");
    }

    async fn notify_driver_timeout(&self, order_id: &str, driver_id: &str) {
        tracing::info!(order_id, driver_id, "driver timed out (logging notification sink)");
    }
}
