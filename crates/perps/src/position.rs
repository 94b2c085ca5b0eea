//! Perpetual position record.

use chrono::{DateTime, Utc};
use hedge_core::types::{PositionId, VenueId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One short perpetual position owned by the manager.
///
/// `size` is signed and negative for shorts; the manager only ever writes
/// shorts but all arithmetic stays sign-correct if that changes. A position
/// that has gone `active = false` is never reactivated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerpPosition {
    pub id: PositionId,
    pub venue: VenueId,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub leverage: u32,
    pub margin: Decimal,
    pub funding_accrued: Decimal,
    pub liquidation_price: Decimal,
    pub opened_at: DateTime<Utc>,
    pub active: bool,
    pub realized_pnl: Option<Decimal>,
}

impl PerpPosition {
    /// Notional value at `mark`.
    pub fn notional(&self, mark: Decimal) -> Decimal {
        self.size.abs() * mark
    }

    /// Collateral backing divided by current notional.
    pub fn margin_ratio(&self, mark: Decimal) -> Decimal {
        let notional = self.notional(mark);
        if notional.is_zero() {
            return Decimal::MAX;
        }
        self.margin / notional
    }

    /// Realized PnL for a short closed at `exit_price`, in units of the
    /// underlying: positive when price fell below entry.
    pub fn close_pnl(&self, exit_price: Decimal) -> Decimal {
        (self.entry_price - exit_price) * self.size.abs() / self.entry_price
    }

    pub fn is_short(&self) -> bool {
        self.size.is_sign_negative() && !self.size.is_zero()
    }
}

/// Outcome of a margin health check, worst tier first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MarginHealth {
    /// Ratio fell below the minimum; emergency margin was injected.
    ToppedUp {
        margin_ratio: Decimal,
        amount: Decimal,
    },
    /// Ratio is in the warning band. Signal only, no action.
    Warning { margin_ratio: Decimal },
    /// Above the warning ratio.
    Healthy,
}
