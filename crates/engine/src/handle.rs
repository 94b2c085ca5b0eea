//! Cloneable client for the engine actor.

use crate::commands::EngineCommand;
use anyhow::Result;
use hedge_core::events::{EngineEvent, EventBus};
use hedge_core::types::{OptionId, PositionId, VenueId};
use hedge_options::{ExpiryResolution, PortfolioGreeks};
use hedge_perps::MarginHealth;
use hedge_risk::{RebalanceOutcome, RiskInputs, RiskSnapshot, RiskState};
use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// Sends commands to the actor and reads its published snapshots.
///
/// Engine-level failures come back through the reply channel; a send or
/// receive error here means the actor itself is gone.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
    snapshot_rx: watch::Receiver<RiskSnapshot>,
    events: EventBus,
}

impl EngineHandle {
    #[must_use]
    pub fn new(
        tx: mpsc::Sender<EngineCommand>,
        snapshot_rx: watch::Receiver<RiskSnapshot>,
        events: EventBus,
    ) -> Self {
        Self {
            tx,
            snapshot_rx,
            events,
        }
    }

    pub async fn open_short(
        &self,
        venue: VenueId,
        size: Decimal,
        leverage: u32,
        max_slippage_bps: u32,
    ) -> Result<PositionId> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::OpenShort {
                venue,
                size,
                leverage,
                max_slippage_bps,
                reply,
            })
            .await?;
        Ok(rx.await??)
    }

    pub async fn close_position(&self, position_id: PositionId) -> Result<Decimal> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::ClosePosition { position_id, reply })
            .await?;
        Ok(rx.await??)
    }

    pub async fn collect_funding(&self) -> Result<Decimal> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(EngineCommand::CollectFunding { reply }).await?;
        Ok(rx.await??)
    }

    pub async fn monitor_health(&self, position_id: PositionId) -> Result<MarginHealth> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::MonitorHealth { position_id, reply })
            .await?;
        Ok(rx.await??)
    }

    pub async fn sell_vol(&self, strike_offset_bps: u32) -> Result<OptionId> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::SellVol {
                strike_offset_bps,
                reply,
            })
            .await?;
        Ok(rx.await??)
    }

    pub async fn refresh_greeks(&self) -> Result<PortfolioGreeks> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(EngineCommand::RefreshGreeks { reply }).await?;
        Ok(rx.await??)
    }

    pub async fn manage_expiries(&self) -> Result<Vec<ExpiryResolution>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(EngineCommand::ManageExpiries { reply }).await?;
        Ok(rx.await??)
    }

    pub async fn execute_rebalance(&self) -> Result<RebalanceOutcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::ExecuteRebalance { reply })
            .await?;
        Ok(rx.await??)
    }

    pub async fn update_risk_inputs(&self, inputs: RiskInputs) -> Result<()> {
        self.tx
            .send(EngineCommand::UpdateRiskInputs { inputs })
            .await?;
        Ok(())
    }

    pub async fn risk_tick(&self) -> Result<RiskState> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(EngineCommand::RiskTick { reply }).await?;
        Ok(rx.await??)
    }

    pub async fn set_target_delta(&self, target: Decimal) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::SetTargetDelta { target, reply })
            .await?;
        Ok(rx.await??)
    }

    pub async fn emergency_close_all(&self, reason: impl Into<String>) -> Result<Decimal> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::EmergencyCloseAll {
                reason: reason.into(),
                reply,
            })
            .await?;
        Ok(rx.await??)
    }

    pub async fn reset_emergency(&self) -> Result<()> {
        self.tx.send(EngineCommand::ResetEmergency).await?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(EngineCommand::Shutdown).await?;
        Ok(())
    }

    /// Latest published snapshot, without touching the actor.
    #[must_use]
    pub fn snapshot(&self) -> RiskSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Waits until the actor publishes a snapshot newer than the one this
    /// handle last observed.
    pub async fn snapshot_changed(&mut self) -> Result<RiskSnapshot> {
        self.snapshot_rx.changed().await?;
        Ok(self.snapshot_rx.borrow().clone())
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// True once the actor has stopped receiving commands.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
