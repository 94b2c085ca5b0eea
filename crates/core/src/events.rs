//! Engine event stream.
//!
//! Every state transition emits exactly one event. Events are the only
//! externally observable side effect besides state itself; monitoring and
//! audit layers subscribe to the bus rather than polling the managers.

use crate::types::{OptionId, PositionId, VenueId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// New short perpetual opened
    PositionOpened {
        position_id: PositionId,
        venue: VenueId,
        size: Decimal,
        entry_price: Decimal,
        leverage: u32,
        margin: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// Perpetual closed with realized PnL
    PositionClosed {
        position_id: PositionId,
        exit_price: Decimal,
        realized_pnl: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// Funding accrued across all active positions for one epoch
    FundingCollected {
        total: Decimal,
        positions: usize,
        timestamp: DateTime<Utc>,
    },

    /// Emergency margin injected into a position near liquidation
    MarginToppedUp {
        position_id: PositionId,
        amount: Decimal,
        margin_ratio: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// Margin ratio entered the warning band
    MarginWarning {
        position_id: PositionId,
        margin_ratio: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// New written put recorded
    OptionSold {
        option_id: OptionId,
        strike: Decimal,
        expiry: DateTime<Utc>,
        quantity: Decimal,
        premium: Decimal,
        iv_bps: u32,
        timestamp: DateTime<Utc>,
    },

    /// Option bought back before expiry
    OptionClosed {
        option_id: OptionId,
        buyback_cost: Decimal,
        realized_pnl: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// Option left to expire worthless, premium kept
    OptionExpired {
        option_id: OptionId,
        realized_pnl: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// Per-unit Greeks recomputed for all active options
    GreeksRefreshed {
        delta: Decimal,
        gamma: Decimal,
        vega: Decimal,
        theta: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// Residual option delta offset through the perp manager
    DeltaHedged {
        option_id: OptionId,
        hedged_delta: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// Rebalance loop ran
    RebalanceExecuted {
        iterations: u32,
        delta_before: Decimal,
        delta_after: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// Risk state machine transitioned
    RiskStateChanged {
        from: String,
        to: String,
        score: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// Emergency switch engaged
    EmergencyActivated {
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Admin parameter updated
    ParameterChanged {
        parameter: String,
        old_value: String,
        new_value: String,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus the managers publish on.
///
/// Cloning is cheap; each manager holds its own clone. Publishing with no
/// subscribers is not an error, the event is simply dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: EngineEvent) {
        // Ignore if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
