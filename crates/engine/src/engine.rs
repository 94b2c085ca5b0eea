//! Engine facade.
//!
//! Owns the two position managers and the risk controller behind one
//! `&mut self` surface, which is the single-writer contract: embed the
//! engine directly and the borrow checker serializes mutations, or run it
//! inside the actor and the command loop does.

use chrono::{DateTime, Utc};
use hedge_core::config::EngineConfig;
use hedge_core::emergency::EmergencySwitch;
use hedge_core::error::Result;
use hedge_core::events::EventBus;
use hedge_core::traits::{OptionsVenue, PerpVenue, PriceFeed};
use hedge_core::types::{OptionId, PositionId, VenueId};
use hedge_options::{ExpiryResolution, OptionPosition, OptionsOverlayManager, PortfolioGreeks};
use hedge_perps::{MarginHealth, PerpPosition, PerpPositionManager};
use hedge_risk::{RebalanceOutcome, RiskController, RiskInputs, RiskSnapshot, RiskState};
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct HedgeEngine {
    perps: PerpPositionManager,
    options: OptionsOverlayManager,
    controller: RiskController,
    emergency: EmergencySwitch,
    events: EventBus,
    inputs: RiskInputs,
}

impl HedgeEngine {
    /// Wires the managers and controller onto one shared emergency switch,
    /// event bus, and price feed.
    pub fn new(
        config: EngineConfig,
        feed: Arc<dyn PriceFeed>,
        perp_venue: Arc<dyn PerpVenue>,
        options_venue: Arc<dyn OptionsVenue>,
    ) -> Self {
        let emergency = EmergencySwitch::new();
        let events = EventBus::default();
        let perps = PerpPositionManager::new(
            config.perps.clone(),
            config.feed.clone(),
            Arc::clone(&feed),
            perp_venue,
            emergency.clone(),
            events.clone(),
        );
        let options = OptionsOverlayManager::new(
            config.options.clone(),
            config.feed.clone(),
            Arc::clone(&feed),
            options_venue,
            emergency.clone(),
            events.clone(),
        );
        let controller = RiskController::new(
            config.risk.clone(),
            config.feed.clone(),
            feed,
            emergency.clone(),
            events.clone(),
        );
        Self {
            perps,
            options,
            controller,
            emergency,
            events,
            inputs: RiskInputs::default(),
        }
    }

    // ==================== Perpetual operations ====================

    pub async fn open_short(
        &mut self,
        venue: VenueId,
        size: Decimal,
        leverage: u32,
        max_slippage_bps: u32,
        now: DateTime<Utc>,
    ) -> Result<PositionId> {
        self.perps
            .open_short(venue, size, leverage, max_slippage_bps, now)
            .await
    }

    pub async fn close_position(
        &mut self,
        position_id: PositionId,
        now: DateTime<Utc>,
    ) -> Result<Decimal> {
        self.perps.close(position_id, now).await
    }

    pub async fn collect_funding(&mut self, now: DateTime<Utc>) -> Result<Decimal> {
        self.perps.collect_funding(now).await
    }

    pub async fn monitor_health(
        &mut self,
        position_id: PositionId,
        now: DateTime<Utc>,
    ) -> Result<MarginHealth> {
        self.perps.monitor_health(position_id, now).await
    }

    // ==================== Options operations ====================

    pub async fn sell_vol(
        &mut self,
        strike_offset_bps: u32,
        now: DateTime<Utc>,
    ) -> Result<OptionId> {
        self.options
            .sell_vol(strike_offset_bps, &mut self.perps, now)
            .await
    }

    pub async fn refresh_greeks(&mut self, now: DateTime<Utc>) -> Result<PortfolioGreeks> {
        self.options.refresh_greeks(now).await
    }

    pub async fn manage_expiries(&mut self, now: DateTime<Utc>) -> Result<Vec<ExpiryResolution>> {
        self.options.manage_expiries(now).await
    }

    /// Admin shutdown: forces the risk state machine into Emergency and
    /// unwinds the options overlay. Perp closes stay available afterwards.
    pub async fn emergency_close_all(
        &mut self,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Decimal> {
        self.controller.trigger_emergency(reason, now);
        self.options.emergency_close_all(reason, now).await
    }

    // ==================== Risk operations ====================

    pub fn update_risk_inputs(&mut self, inputs: RiskInputs) {
        self.inputs = inputs;
    }

    /// One keeper cycle of the risk controller: score the latest telemetry,
    /// run the emergency shutdown on a fresh breach, otherwise rebalance.
    pub async fn risk_tick(&mut self, now: DateTime<Utc>) -> Result<RiskState> {
        let before = self.controller.state();
        let state = self.controller.evaluate(&self.inputs, now);

        if state == RiskState::Emergency {
            if before != RiskState::Emergency {
                self.options
                    .emergency_close_all("composite risk score breached emergency threshold", now)
                    .await?;
            }
            return Ok(RiskState::Emergency);
        }

        self.controller
            .execute_rebalance(&mut self.perps, &self.options, now)
            .await?;
        Ok(state)
    }

    pub async fn execute_rebalance(&mut self, now: DateTime<Utc>) -> Result<RebalanceOutcome> {
        self.controller
            .execute_rebalance(&mut self.perps, &self.options, now)
            .await
    }

    pub fn set_target_delta(&mut self, target: Decimal, now: DateTime<Utc>) -> Result<()> {
        self.controller.set_target_delta(target, now)
    }

    pub fn reset_emergency(&mut self, now: DateTime<Utc>) {
        self.controller.reset_emergency(now);
    }

    #[must_use]
    pub fn optimal_hedge_ratio(&self, correlation_bps: u32, volatility_bps: u32) -> u32 {
        self.controller
            .optimal_hedge_ratio(correlation_bps, volatility_bps)
    }

    // ==================== Queries ====================

    #[must_use]
    pub fn snapshot(&self) -> RiskSnapshot {
        self.controller.snapshot(&self.perps, &self.options)
    }

    #[must_use]
    pub fn current_delta(&self) -> Decimal {
        RiskController::current_delta(&self.perps, &self.options)
    }

    #[must_use]
    pub fn portfolio_greeks(&self) -> PortfolioGreeks {
        self.options.portfolio_greeks()
    }

    pub fn get_position(&self, position_id: PositionId) -> Option<&PerpPosition> {
        self.perps.get_position(position_id)
    }

    pub fn get_option(&self, option_id: OptionId) -> Option<&OptionPosition> {
        self.options.get_option(option_id)
    }

    pub fn active_positions(&self) -> Vec<&PerpPosition> {
        self.perps.active_positions()
    }

    pub fn active_options(&self) -> Vec<&OptionPosition> {
        self.options.active_options()
    }

    #[must_use]
    pub fn total_margin(&self) -> Decimal {
        self.perps.total_margin()
    }

    #[must_use]
    pub fn total_funding_accrued(&self) -> Decimal {
        self.perps.total_funding_accrued()
    }

    #[must_use]
    pub fn total_premium_collected(&self) -> Decimal {
        self.options.total_premium_collected()
    }

    #[must_use]
    pub fn is_emergency(&self) -> bool {
        self.emergency.is_engaged()
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }
}
