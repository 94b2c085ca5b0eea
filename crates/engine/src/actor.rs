//! Single-threaded engine actor.
//!
//! All mutations funnel through one mpsc command loop, which realizes the
//! one-writer-per-engine concurrency contract without locks. After every
//! mutating command the actor pushes a fresh `RiskSnapshot` onto a watch
//! channel so monitoring reads never touch the engine itself.

use crate::commands::EngineCommand;
use crate::engine::HedgeEngine;
use crate::handle::EngineHandle;
use chrono::Utc;
use hedge_risk::RiskSnapshot;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

pub struct EngineActor {
    engine: HedgeEngine,
    rx: mpsc::Receiver<EngineCommand>,
    snapshot_tx: watch::Sender<RiskSnapshot>,
}

/// Spawns the engine onto the runtime and returns the cloneable handle.
pub fn spawn_engine(engine: HedgeEngine, command_buffer: usize) -> (EngineHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(command_buffer);
    let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot());
    let events = engine.events().clone();
    let actor = EngineActor {
        engine,
        rx,
        snapshot_tx,
    };
    let join = tokio::spawn(actor.run());
    (EngineHandle::new(tx, snapshot_rx, events), join)
}

impl EngineActor {
    /// Processes commands until `Shutdown` or every handle is dropped.
    pub async fn run(mut self) {
        info!("engine actor started");

        while let Some(cmd) = self.rx.recv().await {
            let now = Utc::now();
            match cmd {
                EngineCommand::OpenShort {
                    venue,
                    size,
                    leverage,
                    max_slippage_bps,
                    reply,
                } => {
                    let result = self
                        .engine
                        .open_short(venue, size, leverage, max_slippage_bps, now)
                        .await;
                    let _ = reply.send(result);
                }
                EngineCommand::ClosePosition { position_id, reply } => {
                    let _ = reply.send(self.engine.close_position(position_id, now).await);
                }
                EngineCommand::CollectFunding { reply } => {
                    let _ = reply.send(self.engine.collect_funding(now).await);
                }
                EngineCommand::MonitorHealth { position_id, reply } => {
                    let _ = reply.send(self.engine.monitor_health(position_id, now).await);
                }
                EngineCommand::SellVol {
                    strike_offset_bps,
                    reply,
                } => {
                    let _ = reply.send(self.engine.sell_vol(strike_offset_bps, now).await);
                }
                EngineCommand::RefreshGreeks { reply } => {
                    let _ = reply.send(self.engine.refresh_greeks(now).await);
                }
                EngineCommand::ManageExpiries { reply } => {
                    let _ = reply.send(self.engine.manage_expiries(now).await);
                }
                EngineCommand::ExecuteRebalance { reply } => {
                    let _ = reply.send(self.engine.execute_rebalance(now).await);
                }
                EngineCommand::UpdateRiskInputs { inputs } => {
                    self.engine.update_risk_inputs(inputs);
                }
                EngineCommand::RiskTick { reply } => {
                    let _ = reply.send(self.engine.risk_tick(now).await);
                }
                EngineCommand::SetTargetDelta { target, reply } => {
                    let _ = reply.send(self.engine.set_target_delta(target, now));
                }
                EngineCommand::EmergencyCloseAll { reason, reply } => {
                    let _ = reply.send(self.engine.emergency_close_all(&reason, now).await);
                }
                EngineCommand::ResetEmergency => {
                    self.engine.reset_emergency(now);
                }
                EngineCommand::Shutdown => {
                    info!("engine actor shutting down");
                    break;
                }
            }
            let _ = self.snapshot_tx.send(self.engine.snapshot());
        }

        info!("engine actor stopped");
    }
}
