//! Driver aggregate and its state machine (spec §3, §4.6).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fleet::FleetTag;
use super::geo::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    Idle,
    Enroute,
    Arrived,
    Executing,
    Inactive,
}

impl DriverState {
    /// The wire string used in pub/sub event payloads (spec §6).
    pub fn as_str(&self) -> &'static str {
        use DriverState::*;
        match self {
            Idle => "idle",
            Enroute => "enroute",
            Arrived => "arrived",
            Executing => "executing",
            Inactive => "inactive",
        }
    }

    /// Whether `self -> next` is a legal transition per spec §4.6.
    ///
    /// `Idle <-> Inactive` is administrative and never produced by the
    /// dispatch flow itself; it is still a legal pair so operator tooling
    /// built on this state machine is not forced to bypass it.
    pub fn can_transition_to(&self, next: DriverState) -> bool {
        use DriverState::*;
        matches!(
            (self, next),
            (Idle, Enroute)
                | (Enroute, Arrived)
                | (Arrived, Executing)
                | (Executing, Idle)
                | (Idle, Inactive)
                | (Inactive, Idle)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: String,
    pub short_id: String,
    pub plate: String,
    pub fleet: FleetTag,
    pub approved: bool,
    pub active: bool,
    pub online: bool,
    pub state: DriverState,
    pub location: Option<Coordinate>,
    pub push_token: Option<String>,
    /// Fleet tags this driver will not accept (spec §4.2 stage 1(e)).
    pub reject_list: HashSet<FleetTag>,
    pub scheduled_hold: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    /// spec §3: "only drivers with online ∧ active ∧ approved ∧ state=idle
    /// are eligible for offering."
    pub fn is_eligible_base(&self) -> bool {
        self.online && self.active && self.approved && self.state == DriverState::Idle
    }

    /// spec §4.2 stage 1(e): order's fleet is in the driver's reject-list.
    pub fn rejects_fleet(&self, fleet: FleetTag) -> bool {
        self.reject_list.contains(&fleet)
    }

    /// spec §4.2 stage 1(c): has a scheduled order within the next hour.
    pub fn has_near_term_schedule_hold(&self, within: chrono::Duration, now: DateTime<Utc>) -> bool {
        match self.scheduled_hold {
            Some(at) => at - now <= within && at >= now,
            None => false,
        }
    }

    pub fn transition(&mut self, next: DriverState, now: DateTime<Utc>) -> Result<(), InvalidDriverTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidDriverTransition { from: self.state, to: next });
        }
        self.state = next;
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("illegal driver transition {from:?} -> {to:?}")]
pub struct InvalidDriverTransition {
    pub from: DriverState,
    pub to: DriverState,
}
