//! Types for the written-put overlay.

use chrono::{DateTime, Utc};
use hedge_core::types::OptionId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-unit sensitivities of one written put, writer's view.
///
/// Delta is positive for the writer: the short put gains as the underlying
/// rises. Theta is positive too, premium decays in the writer's favor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionGreeks {
    pub delta: Decimal,
    pub gamma: Decimal,
    pub vega: Decimal,
    pub theta: Decimal,
}

impl OptionGreeks {
    /// Scales per-unit Greeks by a contract quantity.
    #[must_use]
    pub fn scale(&self, quantity: Decimal) -> Self {
        Self {
            delta: self.delta * quantity,
            gamma: self.gamma * quantity,
            vega: self.vega * quantity,
            theta: self.theta * quantity,
        }
    }
}

/// How a written option left the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionCloseReason {
    /// Expired out-of-the-money; full premium kept.
    Expired,
    /// Bought back ahead of expiry to avoid assignment.
    EarlyClose,
    /// Unwound by the emergency path.
    Emergency,
}

impl std::fmt::Display for OptionCloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expired => write!(f, "expired"),
            Self::EarlyClose => write!(f, "early_close"),
            Self::Emergency => write!(f, "emergency"),
        }
    }
}

/// One written put owned by the overlay manager.
///
/// Created by a vol sale, re-marked by Greek refreshes, terminated exactly
/// once by expiry resolution or a close. Never reactivated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionPosition {
    pub id: OptionId,
    pub strike: Decimal,
    pub expiry: DateTime<Utc>,
    /// Contracts written; positive count, the short side is implied.
    pub quantity: Decimal,
    pub premium_collected: Decimal,
    pub greeks: OptionGreeks,
    pub opened_at: DateTime<Utc>,
    pub active: bool,
    pub close_reason: Option<OptionCloseReason>,
    pub realized_pnl: Option<Decimal>,
}

impl OptionPosition {
    /// Time to expiry, negative once past due.
    pub fn time_to_expiry(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.expiry - now
    }

    /// In-the-money test for a written put: the holder exercises when the
    /// mark is below strike.
    pub fn is_itm(&self, mark: Decimal) -> bool {
        mark < self.strike
    }
}

/// Outcome of resolving one option in an expiry sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpiryResolution {
    pub option_id: OptionId,
    pub reason: OptionCloseReason,
    pub realized_pnl: Decimal,
}
