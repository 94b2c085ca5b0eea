//! Risk scoring, the Normal/Warning/Emergency state machine, and the
//! delta rebalancing loop that keeps the two position books netted out.

pub mod controller;
pub mod score;
pub mod state;

pub use controller::RiskController;
pub use score::{composite_score, RiskInputs};
pub use state::{RebalanceOutcome, RiskSnapshot, RiskState};
