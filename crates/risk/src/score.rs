//! Composite risk scoring.
//!
//! Five externally supplied telemetry readings, each normalized to 0-100,
//! are folded into one weighted score on the same scale. The controller
//! compares that score against its warning and emergency thresholds; the
//! normalization itself (how raw leverage or volatility maps onto 0-100)
//! belongs to whoever produces the inputs.

use hedge_core::config::RiskWeights;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Normalized telemetry inputs, each on a 0-100 scale where 100 is worst.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskInputs {
    pub leverage_ratio: Decimal,
    pub liquidity_ratio: Decimal,
    pub drawdown: Decimal,
    pub correlation: Decimal,
    pub realized_volatility: Decimal,
}

/// Weighted average of the five inputs. Inputs outside 0-100 are clamped
/// before weighting so one bad reading cannot blow past the scale.
#[must_use]
pub fn composite_score(inputs: &RiskInputs, weights: &RiskWeights) -> Decimal {
    let hundred = Decimal::from(100);
    let clamp = |v: Decimal| v.clamp(Decimal::ZERO, hundred);

    let weighted = clamp(inputs.leverage_ratio) * Decimal::from(weights.leverage)
        + clamp(inputs.liquidity_ratio) * Decimal::from(weights.liquidity)
        + clamp(inputs.drawdown) * Decimal::from(weights.drawdown)
        + clamp(inputs.correlation) * Decimal::from(weights.correlation)
        + clamp(inputs.realized_volatility) * Decimal::from(weights.volatility);

    weighted / hundred
}
