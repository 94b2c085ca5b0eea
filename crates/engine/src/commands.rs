//! Actor command protocol.
//!
//! One variant per engine entry point. Commands that return something
//! carry a oneshot reply sender; the actor stamps `Utc::now()` on dispatch
//! so callers never supply timestamps.

use hedge_core::error::Result;
use hedge_core::types::{OptionId, PositionId, VenueId};
use hedge_options::{ExpiryResolution, PortfolioGreeks};
use hedge_perps::MarginHealth;
use hedge_risk::{RebalanceOutcome, RiskInputs, RiskState};
use rust_decimal::Decimal;
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum EngineCommand {
    OpenShort {
        venue: VenueId,
        size: Decimal,
        leverage: u32,
        max_slippage_bps: u32,
        reply: oneshot::Sender<Result<PositionId>>,
    },
    ClosePosition {
        position_id: PositionId,
        reply: oneshot::Sender<Result<Decimal>>,
    },
    CollectFunding {
        reply: oneshot::Sender<Result<Decimal>>,
    },
    MonitorHealth {
        position_id: PositionId,
        reply: oneshot::Sender<Result<MarginHealth>>,
    },
    SellVol {
        strike_offset_bps: u32,
        reply: oneshot::Sender<Result<OptionId>>,
    },
    RefreshGreeks {
        reply: oneshot::Sender<Result<PortfolioGreeks>>,
    },
    ManageExpiries {
        reply: oneshot::Sender<Result<Vec<ExpiryResolution>>>,
    },
    ExecuteRebalance {
        reply: oneshot::Sender<Result<RebalanceOutcome>>,
    },
    UpdateRiskInputs {
        inputs: RiskInputs,
    },
    RiskTick {
        reply: oneshot::Sender<Result<RiskState>>,
    },
    SetTargetDelta {
        target: Decimal,
        reply: oneshot::Sender<Result<()>>,
    },
    EmergencyCloseAll {
        reason: String,
        reply: oneshot::Sender<Result<Decimal>>,
    },
    ResetEmergency,
    Shutdown,
}
