pub mod payload;
pub mod protocol;
pub mod timeout;
pub mod wait_loop;

pub use payload::{build_offer_payload, compensated_eta, OfferPayload};
pub use protocol::{offer_to_candidates, DispatchOutcome};
pub use wait_loop::WaitOutcome;
