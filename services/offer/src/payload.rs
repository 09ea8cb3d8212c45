//! The per-driver offer payload and ETA compensation (spec §4.3).

use selector::RankedCandidate;
use shared::domain::{Location, Order};
use shared::Settings;

#[derive(Debug, Clone, serde::Serialize)]
pub struct OfferPayload {
    pub order_id: String,
    pub pickup: Location,
    pub destination: Option<Location>,
    pub remarks: Option<String>,
    pub raw_order_text: String,
    pub eta_minutes: f64,
    pub distance_km: f64,
    pub timeout_secs: u64,
}

/// `base_eta + floor(i * T_round / 30)` (spec §4.3), with the 30-second
/// accumulation window exposed as `settings.compensation_granularity_secs`
/// per spec §9's open question rather than hard-coded.
pub fn compensated_eta(base_eta_minutes: f64, candidate_index: usize, settings: &Settings) -> f64 {
    let bonus_minutes = (candidate_index as u64 * settings.t_round_secs) / settings.compensation_granularity_secs;
    base_eta_minutes + bonus_minutes as f64
}

pub fn build_offer_payload(order: &Order, candidate: &RankedCandidate, candidate_index: usize, settings: &Settings) -> OfferPayload {
    OfferPayload {
        order_id: order.id.to_string(),
        pickup: order.pickup.clone(),
        destination: order.destination.clone(),
        remarks: order.remarks.clone(),
        raw_order_text: order.pickup.input_text.clone(),
        eta_minutes: compensated_eta(candidate.time_minutes, candidate_index, settings),
        distance_km: candidate.distance_km,
        timeout_secs: settings.t_round_secs,
    }
}
