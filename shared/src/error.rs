//! Error taxonomy (spec §7).

use thiserror::Error;

/// The error kinds spec §7 calls out, each with its own handling policy.
/// Callers match on variant rather than message text so the policy table
/// in §7 can be implemented as a `match`, not string sniffing.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// KV unreachable, pub/sub publish failure: log and fall back to
    /// poll-only wait mode; never fails the order by itself.
    #[error("coordination service unavailable: {0}")]
    Coordination(String),

    /// Route-matrix timeout or provider error: abort this attempt, order
    /// goes to `failed` with reason "selection error".
    #[error("route-matrix call failed: {0}")]
    RouteMatrix(String),

    /// Mobile push failed for one driver: skip this candidate.
    #[error("push delivery failed: {0}")]
    Push(String),

    /// Document-store write failed on a status transition: surface to the
    /// caller, don't publish an event for a transition that didn't persist.
    #[error("document store error: {0}")]
    Store(String),

    /// A queue message could not be deserialized into an `Order`: discard,
    /// never requeue.
    #[error("invalid queue message: {0}")]
    InvalidMessage(String),

    /// The dispatch lock could not be extended or was lost outright:
    /// fatal for this dispatch attempt, stop without touching shared state.
    #[error("dispatch lock lost for order {order_id}")]
    LockLost { order_id: String },

    #[error("driver {driver_id} is busy")]
    DriverBusy { driver_id: String },

    #[error("order {order_id} is no longer waiting")]
    OrderNotWaiting { order_id: String },
}

pub type Result<T> = std::result::Result<T, DispatchError>;
