//! Coordination primitives (component A): named locks, pub/sub event
//! channels, and the ephemeral KV-store records that ride on top of
//! them. Everything here is backed by [`kv::KvStore`]'s atomic
//! set-if-absent-with-TTL and compare-and-delete primitives (spec §4.1).

pub mod atomic_notify;
pub mod kv;
pub mod locks;
pub mod notifying_order;
pub mod pubsub;

pub mod fake;

pub use atomic_notify::{atomic_notify, NotifyGuard};
pub use kv::KvStore;
pub use locks::{dispatch_lock, driver_notification_lock, reject_lock, LockToken, NamedLock};
pub use pubsub::EventBus;
