//! Basis-point arithmetic helpers.
//!
//! Every ratio that crosses a boundary (strike offsets, slippage caps,
//! confidence, hedge ratios) is expressed in basis points and converted to
//! a `Decimal` ratio in exactly one place, here. All business math is
//! `Decimal`; floats never appear in position or risk state.

use rust_decimal::Decimal;

/// One whole unit expressed in basis points.
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Converts basis points to a decimal ratio (e.g. 500 -> 0.05).
pub fn bps_to_ratio(bps: u32) -> Decimal {
    Decimal::from(bps) / Decimal::from(BPS_DENOMINATOR)
}

/// Scales `value` down by `bps` (e.g. a strike 500 bps below mark).
pub fn apply_bps_discount(value: Decimal, bps: u32) -> Decimal {
    value * Decimal::from(BPS_DENOMINATOR - bps.min(BPS_DENOMINATOR)) / Decimal::from(BPS_DENOMINATOR)
}

/// Scales `value` up by `bps`.
pub fn apply_bps_premium(value: Decimal, bps: u32) -> Decimal {
    value * Decimal::from(BPS_DENOMINATOR + bps) / Decimal::from(BPS_DENOMINATOR)
}

/// Collapses negative zero to the canonical non-negative zero.
///
/// `Decimal` preserves the sign bit through subtraction, so `5 - 5` can
/// report `is_sign_negative()` depending on how it was produced. Aggregates
/// that feed comparisons or events pass through here first.
pub fn normalize_zero(value: Decimal) -> Decimal {
    if value.is_zero() {
        Decimal::ZERO
    } else {
        value
    }
}
