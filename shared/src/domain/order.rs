//! Order aggregate and its state machine (spec §3, §4.6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fleet::FleetTag;
use super::geo::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Instant,
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Waiting,
    /// Scheduled-only: a driver has pre-claimed a future order.
    ScheduledAccepted,
    Enroute,
    Arrived,
    Executing,
    Completed,
    Cancelled,
    Failed,
}

impl OrderStatus {
    /// The wire string used in pub/sub event payloads (spec §6); kept in
    /// sync with the `Serialize` impl's `snake_case` rename by hand so
    /// event publishing doesn't pay for a JSON round trip just to embed
    /// a status string inside a larger JSON value.
    pub fn as_str(&self) -> &'static str {
        use OrderStatus::*;
        match self {
            Waiting => "waiting",
            ScheduledAccepted => "scheduled_accepted",
            Enroute => "enroute",
            Arrived => "arrived",
            Executing => "executing",
            Completed => "completed",
            Cancelled => "cancelled",
            Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Failed)
    }

    /// Whether `self -> next` is a legal transition per spec §4.6.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        if self.is_terminal() {
            return false;
        }
        if next == Cancelled {
            // "Any non-terminal -> cancelled is permitted by the operator path."
            return true;
        }
        matches!(
            (self, next),
            (Waiting, Enroute)
                | (Waiting, Failed)
                | (Waiting, ScheduledAccepted)
                | (ScheduledAccepted, Enroute)
                | (Enroute, Arrived)
                | (Arrived, Executing)
                | (Executing, Completed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventKind {
    Created,
    DriverNotified,
    DriverReject,
    DriverTimeout,
    DriverAccept,
    DriverArrived,
    CustomerOnboard,
    Completed,
    DispatchCancel,
}

/// One append-only entry in an order's lifecycle log (spec §3).
///
/// `round` pins the entry to the dispatch round it happened in, which is
/// what makes idempotent retries detectable (spec §8 invariant 4): two
/// attempts to record `(order, driver, round, action)` collapse to one
/// entry when `record_event` is used instead of pushing directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLogEntry {
    pub kind: OrderEventKind,
    pub driver_id: Option<String>,
    pub round: u32,
    pub at: DateTime<Utc>,
    pub detail: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub input_text: String,
    pub resolved_address: String,
    pub coord: Option<Coordinate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatorMeta {
    pub source: String,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub short_id: String,
    pub kind: OrderKind,
    pub status: OrderStatus,
    pub fleet: FleetTag,
    pub pickup: Location,
    pub destination: Option<Location>,
    pub remarks: Option<String>,
    pub scheduled_pickup_at: Option<DateTime<Utc>>,
    pub rounds: u32,
    pub assigned_driver: Option<String>,
    pub log: Vec<OrderLogEntry>,
    pub creator: CreatorMeta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set once the expiry-reminder pass (spec §4.7 step 1) has pushed a
    /// reminder to the assigned driver, so it fires at most once.
    pub driver_notified: bool,
    pub converted_from: Option<OrderKind>,
}

impl Order {
    /// Apply `next`, recording the transition if legal.
    ///
    /// Returns `Err` without mutating anything on an illegal transition —
    /// callers are expected to treat that as a concurrent-state-transition
    /// error per spec §7 ("recover locally: exit with the observed terminal
    /// state") rather than a hard failure.
    pub fn transition(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition { from: self.status, to: next });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Append a log entry unless one for the same `(driver_id, round, kind)`
    /// already exists — the idempotence guarantee required by spec §8
    /// invariant 4.
    pub fn record_event(&mut self, entry: OrderLogEntry) {
        let duplicate = self.log.iter().any(|e| {
            e.kind == entry.kind && e.round == entry.round && e.driver_id == entry.driver_id
        });
        if !duplicate {
            self.log.push(entry);
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("illegal order transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: OrderStatus,
    pub to: OrderStatus,
}
