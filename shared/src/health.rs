//! Minimal health snapshot: pool reachability flags and time since the
//! last successful queue poll, reported as a periodic `tracing` event
//! rather than an HTTP endpoint — there is no outer surface to serve it
//! to, just the binary's own logs.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct HealthState {
    postgres_up: AtomicBool,
    redis_up: AtomicBool,
    nats_up: AtomicBool,
    last_queue_poll_unix: AtomicI64,
}

impl HealthState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_postgres_up(&self, up: bool) {
        self.postgres_up.store(up, Ordering::Relaxed);
    }

    pub fn set_redis_up(&self, up: bool) {
        self.redis_up.store(up, Ordering::Relaxed);
    }

    pub fn set_nats_up(&self, up: bool) {
        self.nats_up.store(up, Ordering::Relaxed);
    }

    pub fn record_queue_poll(&self) {
        self.last_queue_poll_unix.store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let last_poll = self.last_queue_poll_unix.load(Ordering::Relaxed);
        HealthSnapshot {
            postgres_up: self.postgres_up.load(Ordering::Relaxed),
            redis_up: self.redis_up.load(Ordering::Relaxed),
            nats_up: self.nats_up.load(Ordering::Relaxed),
            seconds_since_last_queue_poll: if last_poll == 0 {
                None
            } else {
                Some((Utc::now().timestamp() - last_poll).max(0))
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub postgres_up: bool,
    pub redis_up: bool,
    pub nats_up: bool,
    pub seconds_since_last_queue_poll: Option<i64>,
}

/// Logs the snapshot on an interval until `cancellation` fires. Intended
/// to be spawned once alongside a binary's main worker loop.
pub async fn run_periodic_reporter(state: Arc<HealthState>, interval_secs: u64, cancellation: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => return,
            _ = interval.tick() => {
                let snapshot = state.snapshot();
                tracing::info!(
                    postgres_up = snapshot.postgres_up,
                    redis_up = snapshot.redis_up,
                    nats_up = snapshot.nats_up,
                    seconds_since_last_queue_poll = snapshot.seconds_since_last_queue_poll,
                    "health snapshot",
                );
            }
        }
    }
}
