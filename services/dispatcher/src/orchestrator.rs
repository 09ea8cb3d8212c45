//! The dispatch orchestrator's per-order handler (component D, spec
//! §4.5): selection, offering, and the post-dispatch bookkeeping that
//! runs regardless of outcome.

use std::sync::Arc;

use chrono::Utc;
use offer::{offer_to_candidates, DispatchOutcome};
use selector::CandidateSelector;
use shared::coordination::pubsub::{OrderEventType, ORDER_STATUS_CHANGES_CHANNEL};
use shared::coordination::{dispatch_lock, EventBus, KvStore};
use shared::domain::{Order, OrderKind, OrderStatus};
use shared::ports::{NotificationSink, OrderStore, PushProvider};
use shared::Settings;
use tokio_util::sync::CancellationToken;

pub struct DispatchOrchestrator {
    kv: Arc<dyn KvStore>,
    event_bus: Arc<dyn EventBus>,
    order_store: Arc<dyn OrderStore>,
    push: Arc<dyn PushProvider>,
    notifications: Arc<dyn NotificationSink>,
    selector: Arc<CandidateSelector>,
    settings: Settings,
}

impl DispatchOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kv: Arc<dyn KvStore>,
        event_bus: Arc<dyn EventBus>,
        order_store: Arc<dyn OrderStore>,
        push: Arc<dyn PushProvider>,
        notifications: Arc<dyn NotificationSink>,
        selector: Arc<CandidateSelector>,
        settings: Settings,
    ) -> Self {
        Self { kv, event_bus, order_store, push, notifications, selector, settings }
    }

    /// Runs one full dispatch attempt for `order`, then unconditionally
    /// bumps `rounds`/`updated_at` (spec §4.5 step 4) no matter which
    /// branch below was taken.
    pub async fn handle_order(&self, mut order: Order, cancellation: CancellationToken) {
        let order_id = order.id.to_string();

        if order.kind == OrderKind::Scheduled {
            tracing::warn!(order_id = %order_id, "scheduled order leaked into instant-order queue, dropping");
            return;
        }

        let lock = dispatch_lock(self.kv.clone(), &order_id, self.settings.t_round_secs + 10);
        let token = match lock.acquire().await {
            Ok(Some(t)) => t,
            Ok(None) => {
                tracing::info!(order_id = %order_id, "dispatch lock already held, skipping this delivery");
                return;
            }
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "coordination error acquiring dispatch lock");
                return;
            }
        };

        if let Err(e) = self.run_dispatch(&mut order, &lock, &token, cancellation).await {
            tracing::error!(order_id = %order_id, error = %e, "dispatch attempt errored");
        }

        let _ = lock.release(&token).await;

        order.rounds += 1;
        order.updated_at = Utc::now();
        if let Err(e) = self.order_store.save(&order).await {
            tracing::error!(order_id = %order_id, error = %e, "failed to persist round/updated_at bump");
        }
    }

    async fn run_dispatch(
        &self,
        order: &mut Order,
        lock: &shared::coordination::NamedLock,
        token: &shared::coordination::LockToken,
        cancellation: CancellationToken,
    ) -> anyhow::Result<()> {
        let candidates = match self.selector.select(order).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "candidate selection failed");
                self.fail_order(order, "selection error").await?;
                return Ok(());
            }
        };

        if candidates.is_empty() {
            self.fail_order(order, "no drivers").await?;
            return Ok(());
        }

        let outcome = offer_to_candidates(
            self.kv.clone(),
            self.event_bus.clone(),
            self.order_store.clone(),
            self.push.clone(),
            self.notifications.clone(),
            order,
            &candidates,
            lock,
            token,
            &self.settings,
            cancellation,
        )
        .await?;

        match outcome {
            DispatchOutcome::Accepted => {
                self.order_store.save(order).await?;
                self.publish_status_change(order, OrderStatus::Waiting, "driver accepted", OrderEventType::Accepted).await;
            }
            DispatchOutcome::Exhausted => {
                // spec §4.5 step 3: only mark failed if a final re-read
                // still shows waiting — otherwise another path took it.
                if let Some(fresh) = self.order_store.get(&order.id.to_string()).await? {
                    if fresh.status == OrderStatus::Waiting {
                        self.fail_order(order, "no acceptance").await?;
                    }
                }
            }
            DispatchOutcome::StoppedExternally => {}
        }

        Ok(())
    }

    async fn fail_order(&self, order: &mut Order, reason: &str) -> anyhow::Result<()> {
        order.transition(OrderStatus::Failed, Utc::now()).map_err(|e| anyhow::anyhow!(e))?;
        self.order_store.save(order).await?;
        self.publish_status_change(order, OrderStatus::Waiting, reason, OrderEventType::Failed).await;
        self.notifications.notify_order_failed(&order.id.to_string(), reason).await;
        Ok(())
    }

    async fn publish_status_change(&self, order: &Order, old_status: OrderStatus, reason: &str, event_type: OrderEventType) {
        let payload = serde_json::json!({
            "order_id": order.id.to_string(),
            "old_status": old_status.as_str(),
            "new_status": order.status.as_str(),
            "driver_id": order.assigned_driver,
            "timestamp": Utc::now(),
            "reason": reason,
            "event_type": event_type,
        });
        if let Err(e) = self.event_bus.publish(ORDER_STATUS_CHANGES_CHANNEL, payload).await {
            tracing::warn!(order_id = %order.id, error = %e, "order_status_changes publish failed (best-effort)");
        }
    }
}
