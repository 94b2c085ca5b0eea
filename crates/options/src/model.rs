//! Deterministic placeholder Greek model for written puts.
//!
//! These are not priced Greeks; a production deployment sources Greeks from
//! a pricing venue. What downstream code relies on is the shape, and that
//! is the contract this module keeps:
//!
//! - delta magnitude grows as the put moves in-the-money (step bands on
//!   moneyness),
//! - gamma peaks near the strike and shrinks toward expiry,
//! - vega decays linearly to zero at expiry,
//! - theta accelerates as expiry approaches, positive for the writer.

use crate::types::OptionGreeks;
use chrono::Duration;
use hedge_core::config::OptionsConfig;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Fraction of the original tenor still remaining, clamped to [0, 1].
fn tenor_fraction(time_to_expiry: Duration, tenor: Duration) -> Decimal {
    let tenor_secs = tenor.num_seconds();
    if tenor_secs <= 0 {
        return Decimal::ZERO;
    }
    let remaining = time_to_expiry.num_seconds().clamp(0, tenor_secs);
    Decimal::from(remaining) / Decimal::from(tenor_secs)
}

/// Per-unit Greeks for a written put at `mark` against `strike`.
pub fn put_writer_greeks(
    mark: Decimal,
    strike: Decimal,
    time_to_expiry: Duration,
    config: &OptionsConfig,
) -> OptionGreeks {
    let moneyness = if strike.is_zero() {
        Decimal::ONE
    } else {
        mark / strike
    };
    let tte_frac = tenor_fraction(time_to_expiry, config.tenor());

    // Step bands on moneyness, deepest ITM first.
    let delta = if moneyness <= dec!(0.95) {
        dec!(0.90)
    } else if moneyness < dec!(1.00) {
        dec!(0.65)
    } else if moneyness < dec!(1.05) {
        dec!(0.35)
    } else {
        dec!(0.10)
    };

    let near_strike = (moneyness - Decimal::ONE).abs() < dec!(0.05);
    let gamma_base = if near_strike { dec!(0.05) } else { dec!(0.01) };
    let gamma = gamma_base * tte_frac;

    let vega = config.vega_base * tte_frac;

    let days_left = Decimal::from(time_to_expiry.num_days().max(1));
    let theta = config.theta_base / days_left;

    OptionGreeks {
        delta,
        gamma,
        vega,
        theta,
    }
}
