//! The worker pool that drains the instant-order queue (spec §4.5): each
//! valid message is handed to a per-order handler running concurrently,
//! invalid messages are logged and discarded rather than requeued.

use std::sync::Arc;

use shared::domain::Order;
use shared::ports::InstantOrderConsumer;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::DispatchOrchestrator;

pub struct WorkerPool {
    orchestrator: Arc<DispatchOrchestrator>,
    consumer: Arc<dyn InstantOrderConsumer>,
}

impl WorkerPool {
    pub fn new(orchestrator: Arc<DispatchOrchestrator>, consumer: Arc<dyn InstantOrderConsumer>) -> Self {
        Self { orchestrator, consumer }
    }

    /// Runs until `cancellation` fires or the queue is closed. Each
    /// message's handler is spawned rather than awaited in-line so that
    /// a slow dispatch for one order never delays pulling the next.
    pub async fn run(&self, cancellation: CancellationToken) {
        loop {
            let message = tokio::select! {
                _ = cancellation.cancelled() => return,
                result = self.consumer.next() => result,
            };

            let payload = match message {
                Ok(Some(msg)) => msg.payload,
                Ok(None) => return, // queue closed
                Err(e) => {
                    tracing::error!(error = %e, "instant-order queue read failed");
                    continue;
                }
            };

            let order: Order = match serde_json::from_slice(&payload) {
                Ok(o) => o,
                Err(e) => {
                    tracing::warn!(error = %e, "discarding invalid instant-order queue message");
                    continue;
                }
            };

            let orchestrator = self.orchestrator.clone();
            let handler_cancellation = cancellation.clone();
            tokio::spawn(async move {
                orchestrator.handle_order(order, handler_cancellation).await;
            });
        }
    }
}
