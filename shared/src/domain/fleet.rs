//! Fleet tags and the fleet-matching rule.
//!
//! spec.md §9 flags the two-branch WEI asymmetry as a redesign
//! candidate ("a tabular rule is clearer and should replace the
//! two-branch form"). `FleetTag::may_serve` is that table.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FleetTag {
    Wei,
    Rsk,
    Kd,
}

impl FleetTag {
    /// Whether a driver tagged `self` may be offered an order tagged
    /// `order_fleet`, per spec.md §4.2 stage 1(d):
    /// WEI orders -> WEI drivers only; RSK/KD orders -> any non-WEI driver.
    pub fn may_serve(&self, order_fleet: FleetTag) -> bool {
        match order_fleet {
            FleetTag::Wei => *self == FleetTag::Wei,
            FleetTag::Rsk | FleetTag::Kd => *self != FleetTag::Wei,
        }
    }

    /// Whether the distance/time filtering caps (`D_max`, `T_max`) are
    /// bypassed for this order's fleet, per spec.md §4.2 stage 2/3.
    pub fn bypasses_distance_caps(&self) -> bool {
        matches!(self, FleetTag::Wei)
    }
}
