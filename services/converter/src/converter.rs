//! The scheduled converter (component E, spec §4.7): a standalone
//! ticker that promotes near-term scheduled orders to instant orders
//! and reminds drivers holding one.

use std::sync::Arc;

use chrono::Utc;
use shared::ports::{DriverStore, InstantOrderProducer, OrderStore, PushProvider};
use shared::Settings;
use tokio_util::sync::CancellationToken;

use crate::conversion::run_conversion_pass;
use crate::reminder::run_reminder_pass;

pub struct ScheduledConverter {
    order_store: Arc<dyn OrderStore>,
    driver_store: Arc<dyn DriverStore>,
    push: Arc<dyn PushProvider>,
    queue: Arc<dyn InstantOrderProducer>,
    settings: Settings,
}

impl ScheduledConverter {
    pub fn new(
        order_store: Arc<dyn OrderStore>,
        driver_store: Arc<dyn DriverStore>,
        push: Arc<dyn PushProvider>,
        queue: Arc<dyn InstantOrderProducer>,
        settings: Settings,
    ) -> Self {
        Self { order_store, driver_store, push, queue, settings }
    }

    /// Ticks every `T_check` until cancelled. A slow tick never causes a
    /// burst of catch-up ticks afterward (`MissedTickBehavior::Delay`).
    pub async fn run(&self, cancellation: CancellationToken) {
        let mut interval = tokio::time::interval(self.settings.t_check());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    tracing::info!("scheduled converter shutting down");
                    return;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&self) {
        let now = Utc::now();
        let reminded = run_reminder_pass(&self.order_store, &self.driver_store, &self.push, &self.settings, now).await;
        let converted = run_conversion_pass(&self.order_store, &self.queue, &self.settings, now).await;
        if reminded > 0 || converted > 0 {
            tracing::info!(reminded, converted, "scheduled converter tick complete");
        }
    }
}
