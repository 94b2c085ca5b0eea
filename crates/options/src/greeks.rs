//! Portfolio Greek aggregation.
//!
//! The snapshot is always derived from the active positions in one pass;
//! no running totals are patched anywhere, so it cannot drift from the
//! book.

use crate::types::{OptionGreeks, OptionPosition};
use hedge_core::numeric::normalize_zero;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggregate sensitivities across every active written put.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioGreeks {
    pub delta: Decimal,
    pub gamma: Decimal,
    pub vega: Decimal,
    pub theta: Decimal,
}

impl PortfolioGreeks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one position's per-unit Greeks, scaled by quantity, into the
    /// snapshot.
    pub fn add(&mut self, greeks: &OptionGreeks, quantity: Decimal) {
        self.delta += greeks.delta * quantity;
        self.gamma += greeks.gamma * quantity;
        self.vega += greeks.vega * quantity;
        self.theta += greeks.theta * quantity;
    }

    /// Recomputes the snapshot over `positions`, skipping inactive entries.
    pub fn from_positions<'a>(positions: impl IntoIterator<Item = &'a OptionPosition>) -> Self {
        let mut snapshot = Self::new();
        for position in positions.into_iter().filter(|p| p.active) {
            snapshot.add(&position.greeks, position.quantity);
        }
        snapshot.delta = normalize_zero(snapshot.delta);
        snapshot.vega = normalize_zero(snapshot.vega);
        snapshot
    }

    /// True when aggregate delta sits within `tolerance` of flat.
    #[must_use]
    pub fn is_delta_neutral(&self, tolerance: Decimal) -> bool {
        self.delta.abs() <= tolerance
    }

    /// Delta exposure in underlying units for a given contract multiplier.
    #[must_use]
    pub fn delta_exposure(&self, multiplier: Decimal) -> Decimal {
        self.delta * multiplier
    }
}

impl std::ops::Add for PortfolioGreeks {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            delta: self.delta + other.delta,
            gamma: self.gamma + other.gamma,
            vega: self.vega + other.vega,
            theta: self.theta + other.theta,
        }
    }
}
