//! Logging setup.
//!
//! The source repo's logging helpers interpolated push tokens, addresses,
//! and other passenger-identifying fields straight into `info!` messages.
//! This version only ever logs `order_id`, `driver_id`, and `round` —
//! the identifiers dispatch correctness is actually argued over — and
//! treats payload bodies as opaque.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub fn init() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}
