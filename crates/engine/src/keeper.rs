//! Keeper loops.
//!
//! The engine never self-schedules; these interval tasks drive the
//! time-gated operations from outside. Every call is idempotent on the
//! engine side (funding epochs, expiry sweeps, rebalance intervals), so
//! over-firing is harmless and a missed tick is caught up on the next.

use crate::handle::EngineHandle;
use hedge_core::config::KeeperConfig;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct Keeper {
    handle: EngineHandle,
    config: KeeperConfig,
}

impl Keeper {
    #[must_use]
    pub fn new(handle: EngineHandle, config: KeeperConfig) -> Self {
        Self { handle, config }
    }

    /// Spawns the funding, overlay, and risk loops. Each exits on its own
    /// once the engine actor is gone.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        info!(
            funding_secs = self.config.funding_interval_secs,
            greeks_secs = self.config.greeks_interval_secs,
            risk_secs = self.config.risk_interval_secs,
            "keeper started"
        );
        vec![
            tokio::spawn(funding_loop(
                self.handle.clone(),
                self.config.funding_interval_secs,
            )),
            tokio::spawn(overlay_loop(
                self.handle.clone(),
                self.config.greeks_interval_secs,
            )),
            tokio::spawn(risk_loop(self.handle, self.config.risk_interval_secs)),
        ]
    }
}

async fn funding_loop(handle: EngineHandle, secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(secs));
    loop {
        interval.tick().await;
        if handle.is_closed() {
            break;
        }
        match handle.collect_funding().await {
            Ok(total) if !total.is_zero() => info!(total = %total, "funding collected"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "funding collection failed"),
        }
    }
    info!("funding keeper exited");
}

async fn overlay_loop(handle: EngineHandle, secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(secs));
    loop {
        interval.tick().await;
        if handle.is_closed() {
            break;
        }
        if let Err(e) = handle.refresh_greeks().await {
            error!(error = %e, "greek refresh failed");
        }
        match handle.manage_expiries().await {
            Ok(resolutions) if !resolutions.is_empty() => {
                info!(count = resolutions.len(), "expiries resolved");
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "expiry sweep failed"),
        }
    }
    info!("overlay keeper exited");
}

async fn risk_loop(handle: EngineHandle, secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(secs));
    loop {
        interval.tick().await;
        if handle.is_closed() {
            break;
        }
        if let Err(e) = handle.risk_tick().await {
            error!(error = %e, "risk tick failed");
        }
    }
    info!("risk keeper exited");
}
