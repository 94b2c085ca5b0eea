//! Risk state machine types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Controller state. Warning recovers to Normal when the score falls back;
/// Emergency holds until an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskState {
    Normal,
    Warning,
    Emergency,
}

impl fmt::Display for RiskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Warning => write!(f, "warning"),
            Self::Emergency => write!(f, "emergency"),
        }
    }
}

/// Point-in-time view of the controller, for monitoring surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub state: RiskState,
    pub score: Decimal,
    pub target_delta: Decimal,
    pub current_delta: Decimal,
    pub rebalance_threshold: Decimal,
    pub last_rebalance_at: Option<DateTime<Utc>>,
    pub rebalance_count: u64,
}

/// What a rebalance invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RebalanceOutcome {
    /// Inside the minimum interval since the last acting rebalance.
    TooSoon,
    /// Delta already within threshold of target.
    NotNeeded,
    /// The correction loop ran. `iterations` counts venue actions taken;
    /// zero means the book had nothing left to close.
    Completed {
        iterations: u32,
        delta_before: Decimal,
        delta_after: Decimal,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_display_lowercase() {
        assert_eq!(RiskState::Normal.to_string(), "normal");
        assert_eq!(RiskState::Warning.to_string(), "warning");
        assert_eq!(RiskState::Emergency.to_string(), "emergency");
    }

    #[test]
    fn outcome_serializes_with_variant_name() {
        let outcome = RebalanceOutcome::TooSoon;
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("TooSoon"));
    }
}
