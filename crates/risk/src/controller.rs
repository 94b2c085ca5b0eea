//! Risk state machine and delta rebalancing.
//!
//! The controller never carries its own copy of exposure. Net delta is
//! recomputed from the two managers on every decision, so there is no
//! incremental bookkeeping to drift out of sync with the books.

use crate::score::{composite_score, RiskInputs};
use crate::state::{RebalanceOutcome, RiskSnapshot, RiskState};
use chrono::{DateTime, Utc};
use hedge_core::config::{FeedConfig, RiskConfig};
use hedge_core::emergency::EmergencySwitch;
use hedge_core::error::{EngineError, Result};
use hedge_core::events::{EngineEvent, EventBus};
use hedge_core::feed::fresh_mark;
use hedge_core::numeric::{normalize_zero, BPS_DENOMINATOR};
use hedge_core::traits::PriceFeed;
use hedge_core::types::VenueId;
use hedge_options::OptionsOverlayManager;
use hedge_perps::PerpPositionManager;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct RiskController {
    config: RiskConfig,
    feed_config: FeedConfig,
    feed: Arc<dyn PriceFeed>,
    emergency: EmergencySwitch,
    events: EventBus,
    state: RiskState,
    last_score: Decimal,
    target_delta: Decimal,
    last_rebalance_at: Option<DateTime<Utc>>,
    rebalance_count: u64,
}

impl RiskController {
    pub fn new(
        config: RiskConfig,
        feed_config: FeedConfig,
        feed: Arc<dyn PriceFeed>,
        emergency: EmergencySwitch,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            feed_config,
            feed,
            emergency,
            events,
            state: RiskState::Normal,
            last_score: Decimal::ZERO,
            target_delta: Decimal::ZERO,
            last_rebalance_at: None,
            rebalance_count: 0,
        }
    }

    /// Scores the supplied telemetry and walks the state machine.
    ///
    /// Warning recovers to Normal when the score falls back under the
    /// warning threshold. Emergency is sticky: once entered, only
    /// `reset_emergency` leaves it, whatever later scores say.
    pub fn evaluate(&mut self, inputs: &RiskInputs, now: DateTime<Utc>) -> RiskState {
        let score = composite_score(inputs, &self.config.weights);
        self.last_score = score;

        if self.state == RiskState::Emergency {
            return self.state;
        }

        if score >= self.config.emergency_score {
            self.enter_emergency("composite risk score breached emergency threshold", now);
        } else if score >= self.config.warning_score {
            self.transition(RiskState::Warning, now);
        } else {
            self.transition(RiskState::Normal, now);
        }
        self.state
    }

    /// Admin-forced Emergency, independent of the score.
    pub fn trigger_emergency(&mut self, reason: &str, now: DateTime<Utc>) {
        self.enter_emergency(reason, now);
    }

    /// Manual reset out of Emergency. Releases the shared switch so the
    /// managers accept risk-increasing calls again.
    pub fn reset_emergency(&mut self, now: DateTime<Utc>) {
        if self.state != RiskState::Emergency {
            return;
        }
        self.emergency.release();
        self.transition(RiskState::Normal, now);
    }

    fn enter_emergency(&mut self, reason: &str, now: DateTime<Utc>) {
        if !self.emergency.is_engaged() {
            self.emergency.engage();
            self.events.publish(EngineEvent::EmergencyActivated {
                reason: reason.to_string(),
                timestamp: now,
            });
        }
        warn!(reason, score = %self.last_score, "emergency mode");
        self.transition(RiskState::Emergency, now);
    }

    fn transition(&mut self, to: RiskState, now: DateTime<Utc>) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        info!(%from, %to, score = %self.last_score, "risk state changed");
        self.events.publish(EngineEvent::RiskStateChanged {
            from: from.to_string(),
            to: to.to_string(),
            score: self.last_score,
            timestamp: now,
        });
    }

    /// Strict predicate: deviation exactly at the threshold does not
    /// trigger.
    #[must_use]
    pub fn needs_rebalancing(&self, current_delta: Decimal) -> bool {
        (current_delta - self.target_delta).abs() > self.config.rebalance_threshold
    }

    /// Net delta across both books: active perp sizes plus the written
    /// options' delta exposure.
    #[must_use]
    pub fn current_delta(perps: &PerpPositionManager, options: &OptionsOverlayManager) -> Decimal {
        normalize_zero(perps.perp_delta() + options.delta_exposure())
    }

    /// Pushes net delta back toward the target with a bounded
    /// compute-act-recheck loop.
    ///
    /// Each iteration re-reads the books, so a fill that lands short or a
    /// close that overshoots gets corrected on the next pass rather than
    /// compounding. Excess positive delta is offset with a new short;
    /// excess negative delta is given back by closing whole positions,
    /// largest first. Acting runs stamp the interval gate; calls inside
    /// the minimum interval are no-ops.
    ///
    /// # Errors
    ///
    /// `EmergencyModeBlocked` while the switch is engaged, feed gate
    /// failures, and whatever the perp manager surfaces mid-loop.
    pub async fn execute_rebalance(
        &mut self,
        perps: &mut PerpPositionManager,
        options: &OptionsOverlayManager,
        now: DateTime<Utc>,
    ) -> Result<RebalanceOutcome> {
        self.emergency.guard("execute_rebalance")?;
        if let Some(last) = self.last_rebalance_at {
            if now - last < self.config.min_rebalance_interval() {
                debug!(last_rebalance_at = %last, "rebalance interval not elapsed, no-op");
                return Ok(RebalanceOutcome::TooSoon);
            }
        }

        // Sizing assumes an executable mark underneath the greeks.
        fresh_mark(self.feed.as_ref(), &self.feed_config, "execute_rebalance", now).await?;

        let delta_before = Self::current_delta(perps, options);
        if !self.needs_rebalancing(delta_before) {
            return Ok(RebalanceOutcome::NotNeeded);
        }

        let mut iterations = 0;
        while iterations < self.config.max_rebalance_iterations {
            let excess = Self::current_delta(perps, options) - self.target_delta;
            if excess.abs() <= self.config.rebalance_threshold {
                break;
            }
            if excess > Decimal::ZERO {
                perps
                    .open_short(
                        VenueId::new(self.config.rebalance_venue.clone()),
                        excess,
                        self.config.rebalance_leverage,
                        self.config.rebalance_slippage_bps,
                        now,
                    )
                    .await?;
            } else {
                let Some(position_id) = perps
                    .active_positions()
                    .into_iter()
                    .max_by_key(|p| p.size.abs())
                    .map(|p| p.id)
                else {
                    // Short of target with nothing left to close.
                    break;
                };
                perps.close(position_id, now).await?;
            }
            iterations += 1;
        }

        let delta_after = Self::current_delta(perps, options);
        if iterations == 0 {
            // Took no venue action; leave the interval unstamped so the
            // next tick retries once the book changes.
            return Ok(RebalanceOutcome::Completed {
                iterations,
                delta_before,
                delta_after,
            });
        }

        self.rebalance_count += 1;
        self.last_rebalance_at = Some(now);
        info!(
            iterations,
            delta_before = %delta_before,
            delta_after = %delta_after,
            "rebalance executed"
        );
        self.events.publish(EngineEvent::RebalanceExecuted {
            iterations,
            delta_before,
            delta_after,
            timestamp: now,
        });

        Ok(RebalanceOutcome::Completed {
            iterations,
            delta_before,
            delta_after,
        })
    }

    /// Updates the hedging target.
    ///
    /// # Errors
    ///
    /// `InvalidTargetDelta` past the configured magnitude cap.
    pub fn set_target_delta(&mut self, new_target: Decimal, now: DateTime<Utc>) -> Result<()> {
        if new_target.abs() > self.config.max_target_delta {
            return Err(EngineError::InvalidTargetDelta {
                target: new_target,
                max: self.config.max_target_delta,
            });
        }
        let old = self.target_delta;
        self.target_delta = new_target;
        info!(old = %old, new = %new_target, "target delta updated");
        self.events.publish(EngineEvent::ParameterChanged {
            parameter: "target_delta".to_string(),
            old_value: old.to_string(),
            new_value: new_target.to_string(),
            timestamp: now,
        });
        Ok(())
    }

    /// Correlation-scaled hedge ratio in bps, clamped to the configured
    /// floor and full coverage.
    ///
    /// Advisory sizing for entering a hedge against an external spot bag.
    /// The rebalance loop itself always corrects the full excess; partial
    /// corrections cannot converge inside the iteration bound.
    #[must_use]
    pub fn optimal_hedge_ratio(&self, correlation_bps: u32, volatility_bps: u32) -> u32 {
        let raw = u64::from(correlation_bps) * u64::from(volatility_bps)
            / u64::from(BPS_DENOMINATOR);
        (raw.min(u64::from(BPS_DENOMINATOR)) as u32).max(self.config.min_hedge_ratio_bps)
    }

    pub fn snapshot(
        &self,
        perps: &PerpPositionManager,
        options: &OptionsOverlayManager,
    ) -> RiskSnapshot {
        RiskSnapshot {
            state: self.state,
            score: self.last_score,
            target_delta: self.target_delta,
            current_delta: Self::current_delta(perps, options),
            rebalance_threshold: self.config.rebalance_threshold,
            last_rebalance_at: self.last_rebalance_at,
            rebalance_count: self.rebalance_count,
        }
    }

    #[must_use]
    pub fn state(&self) -> RiskState {
        self.state
    }

    #[must_use]
    pub fn score(&self) -> Decimal {
        self.last_score
    }

    #[must_use]
    pub fn target_delta(&self) -> Decimal {
        self.target_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hedge_core::config::{OptionsConfig, PerpConfig};
    use hedge_paper::{PaperOptionsVenue, PaperPerpVenue, PaperPriceFeed};
    use rust_decimal_macros::dec;

    struct Env {
        controller: RiskController,
        perps: PerpPositionManager,
        options: OptionsOverlayManager,
        feed: PaperPriceFeed,
        perp_venue: PaperPerpVenue,
        emergency: EmergencySwitch,
        events: EventBus,
    }

    fn make_env() -> Env {
        make_env_with_config(RiskConfig::default())
    }

    fn make_env_with_config(config: RiskConfig) -> Env {
        let feed = PaperPriceFeed::new(dec!(50000));
        let perp_venue = PaperPerpVenue::new(dec!(50000));
        let emergency = EmergencySwitch::new();
        let events = EventBus::default();

        let perps = PerpPositionManager::new(
            PerpConfig::default(),
            FeedConfig::default(),
            Arc::new(feed.clone()),
            Arc::new(perp_venue.clone()),
            emergency.clone(),
            events.clone(),
        );
        let options = OptionsOverlayManager::new(
            OptionsConfig::default(),
            FeedConfig::default(),
            Arc::new(feed.clone()),
            Arc::new(PaperOptionsVenue::default()),
            emergency.clone(),
            events.clone(),
        );
        let controller = RiskController::new(
            config,
            FeedConfig::default(),
            Arc::new(feed.clone()),
            emergency.clone(),
            events.clone(),
        );
        Env {
            controller,
            perps,
            options,
            feed,
            perp_venue,
            emergency,
            events,
        }
    }

    fn uniform(value: Decimal) -> RiskInputs {
        RiskInputs {
            leverage_ratio: value,
            liquidity_ratio: value,
            drawdown: value,
            correlation: value,
            realized_volatility: value,
        }
    }

    async fn open_short(env: &mut Env, size: Decimal) {
        env.perps
            .open_short(VenueId::new("paper"), size, 3, 300, Utc::now())
            .await
            .unwrap();
    }

    // ==================== State Machine Tests ====================

    #[test]
    fn normal_to_warning_and_back() {
        let mut env = make_env();
        let now = Utc::now();
        assert_eq!(env.controller.evaluate(&uniform(dec!(65)), now), RiskState::Warning);
        assert_eq!(env.controller.evaluate(&uniform(dec!(30)), now), RiskState::Normal);
    }

    #[test]
    fn warning_threshold_is_inclusive() {
        let mut env = make_env();
        let now = Utc::now();
        assert_eq!(env.controller.evaluate(&uniform(dec!(59.9)), now), RiskState::Normal);
        assert_eq!(env.controller.evaluate(&uniform(dec!(60)), now), RiskState::Warning);
    }

    #[test]
    fn emergency_score_engages_switch_and_sticks() {
        let mut env = make_env();
        let now = Utc::now();
        assert_eq!(env.controller.evaluate(&uniform(dec!(80)), now), RiskState::Emergency);
        assert!(env.emergency.is_engaged());

        // low score does not recover without a manual reset
        assert_eq!(env.controller.evaluate(&uniform(dec!(5)), now), RiskState::Emergency);
        assert!(env.emergency.is_engaged());
    }

    #[test]
    fn normal_jumps_straight_to_emergency_on_extreme_score() {
        let mut env = make_env();
        assert_eq!(
            env.controller.evaluate(&uniform(dec!(95)), Utc::now()),
            RiskState::Emergency
        );
    }

    #[test]
    fn manual_trigger_and_reset_round_trip() {
        let mut env = make_env();
        let now = Utc::now();
        env.controller.trigger_emergency("operator halt", now);
        assert_eq!(env.controller.state(), RiskState::Emergency);
        assert!(env.emergency.is_engaged());

        env.controller.reset_emergency(now);
        assert_eq!(env.controller.state(), RiskState::Normal);
        assert!(!env.emergency.is_engaged());
    }

    #[test]
    fn state_changes_are_published() {
        let mut env = make_env();
        let mut rx = env.events.subscribe();
        env.controller.evaluate(&uniform(dec!(70)), Utc::now());

        let event = rx.try_recv().unwrap();
        match event {
            EngineEvent::RiskStateChanged { from, to, score, .. } => {
                assert_eq!(from, "normal");
                assert_eq!(to, "warning");
                assert_eq!(score, dec!(70));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    // ==================== Rebalance Predicate Tests ====================

    #[test]
    fn needs_rebalancing_is_strict_at_the_threshold() {
        let env = make_env();
        assert!(!env.controller.needs_rebalancing(dec!(0.05)));
        assert!(!env.controller.needs_rebalancing(dec!(-0.05)));
        assert!(env.controller.needs_rebalancing(dec!(0.051)));
        assert!(env.controller.needs_rebalancing(dec!(-0.051)));
    }

    #[test]
    fn needs_rebalancing_measures_deviation_from_target() {
        let mut env = make_env();
        env.controller.set_target_delta(dec!(1), Utc::now()).unwrap();
        assert!(!env.controller.needs_rebalancing(dec!(1.05)));
        assert!(env.controller.needs_rebalancing(dec!(0.94)));
    }

    // ==================== Rebalance Execution Tests ====================

    #[tokio::test]
    async fn rebalance_opens_short_for_positive_excess() {
        let mut env = make_env();
        let now = Utc::now();
        env.controller.set_target_delta(dec!(-2), now).unwrap();

        let outcome = env
            .controller
            .execute_rebalance(&mut env.perps, &env.options, now)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RebalanceOutcome::Completed {
                iterations: 1,
                delta_before: dec!(0),
                delta_after: dec!(-2),
            }
        );
        assert_eq!(env.perps.perp_delta(), dec!(-2));
        assert_eq!(env.perp_venue.open_calls(), 1);

        let snapshot = env.controller.snapshot(&env.perps, &env.options);
        assert_eq!(snapshot.rebalance_count, 1);
        assert_eq!(snapshot.last_rebalance_at, Some(now));
    }

    #[tokio::test]
    async fn rebalance_closes_positions_for_negative_excess() {
        let mut env = make_env();
        open_short(&mut env, dec!(1)).await;
        open_short(&mut env, dec!(3)).await;
        assert_eq!(env.perps.perp_delta(), dec!(-4));

        let now = Utc::now();
        let outcome = env
            .controller
            .execute_rebalance(&mut env.perps, &env.options, now)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RebalanceOutcome::Completed {
                iterations: 2,
                delta_before: dec!(-4),
                delta_after: dec!(0),
            }
        );
        assert_eq!(env.perps.perp_delta(), Decimal::ZERO);
        assert_eq!(env.perp_venue.close_calls(), 2);
    }

    #[tokio::test]
    async fn rebalance_closes_largest_position_first() {
        let mut config = RiskConfig::default();
        config.max_rebalance_iterations = 1;
        let mut env = make_env_with_config(config);
        open_short(&mut env, dec!(1)).await;
        open_short(&mut env, dec!(3)).await;

        env.controller
            .execute_rebalance(&mut env.perps, &env.options, Utc::now())
            .await
            .unwrap();
        assert_eq!(env.perps.perp_delta(), dec!(-1));

        let remaining = env.perps.active_positions();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].size, dec!(-1));
    }

    #[tokio::test]
    async fn rebalance_not_needed_when_within_threshold() {
        let mut env = make_env();
        let outcome = env
            .controller
            .execute_rebalance(&mut env.perps, &env.options, Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, RebalanceOutcome::NotNeeded);
        assert_eq!(env.perp_venue.open_calls(), 0);
        let snapshot = env.controller.snapshot(&env.perps, &env.options);
        assert_eq!(snapshot.rebalance_count, 0);
        assert_eq!(snapshot.last_rebalance_at, None);
    }

    #[tokio::test]
    async fn rebalance_inside_min_interval_is_a_no_op() {
        let mut env = make_env();
        let now = Utc::now();
        env.controller.set_target_delta(dec!(-2), now).unwrap();
        env.controller
            .execute_rebalance(&mut env.perps, &env.options, now)
            .await
            .unwrap();

        // retarget so a rebalance is genuinely needed again
        env.controller.set_target_delta(dec!(0), now).unwrap();
        let outcome = env
            .controller
            .execute_rebalance(&mut env.perps, &env.options, now + chrono::Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(outcome, RebalanceOutcome::TooSoon);
        assert_eq!(env.perp_venue.close_calls(), 0);

        // past the interval it acts
        let later = now + chrono::Duration::hours(2);
        env.feed.set_timestamp(later);
        let outcome = env
            .controller
            .execute_rebalance(&mut env.perps, &env.options, later)
            .await
            .unwrap();
        assert!(matches!(outcome, RebalanceOutcome::Completed { .. }));
        assert_eq!(env.perps.perp_delta(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn rebalance_with_nothing_to_close_takes_no_action() {
        let mut env = make_env();
        let now = Utc::now();
        // positive target with an empty book: reducing shorts is impossible
        env.controller.set_target_delta(dec!(1), now).unwrap();

        let outcome = env
            .controller
            .execute_rebalance(&mut env.perps, &env.options, now)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RebalanceOutcome::Completed {
                iterations: 0,
                delta_before: dec!(0),
                delta_after: dec!(0),
            }
        );
        assert_eq!(env.perp_venue.open_calls(), 0);
        assert_eq!(env.perp_venue.close_calls(), 0);
        // zero-action runs do not consume the interval
        let snapshot = env.controller.snapshot(&env.perps, &env.options);
        assert_eq!(snapshot.last_rebalance_at, None);
        assert_eq!(snapshot.rebalance_count, 0);
    }

    #[tokio::test]
    async fn rebalance_blocked_in_emergency() {
        let mut env = make_env();
        env.controller.trigger_emergency("test", Utc::now());
        let err = env
            .controller
            .execute_rebalance(&mut env.perps, &env.options, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmergencyModeBlocked { .. }));
    }

    #[tokio::test]
    async fn rebalance_requires_fresh_mark() {
        let mut env = make_env();
        let now = Utc::now();
        env.controller.set_target_delta(dec!(-2), now).unwrap();
        env.feed.set_timestamp(now - chrono::Duration::hours(2));

        let err = env
            .controller
            .execute_rebalance(&mut env.perps, &env.options, now)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StalePrice { .. }));
        assert_eq!(env.perp_venue.open_calls(), 0);
    }

    #[tokio::test]
    async fn rebalance_nets_options_against_perps() {
        let mut env = make_env();
        let now = Utc::now();
        // writes 10 puts (delta 0.10 each) and auto-hedges the 1.0 residual
        env.options.sell_vol(500, &mut env.perps, now).await.unwrap();
        assert_eq!(
            RiskController::current_delta(&env.perps, &env.options),
            Decimal::ZERO
        );
        let outcome = env
            .controller
            .execute_rebalance(&mut env.perps, &env.options, now)
            .await
            .unwrap();
        assert_eq!(outcome, RebalanceOutcome::NotNeeded);

        // dropping the hedge leaves the option delta exposed
        let hedge_id = env.perps.active_positions()[0].id;
        env.perps.close(hedge_id, now).await.unwrap();
        assert_eq!(
            RiskController::current_delta(&env.perps, &env.options),
            dec!(1.0)
        );

        let outcome = env
            .controller
            .execute_rebalance(&mut env.perps, &env.options, now)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RebalanceOutcome::Completed {
                iterations: 1,
                delta_before: dec!(1.0),
                delta_after: dec!(0),
            }
        );
        assert_eq!(env.perps.perp_delta(), dec!(-1.0));
    }

    #[tokio::test]
    async fn rebalance_executed_event_is_published() {
        let mut env = make_env();
        let now = Utc::now();
        env.controller.set_target_delta(dec!(-2), now).unwrap();
        let mut rx = env.events.subscribe();

        env.controller
            .execute_rebalance(&mut env.perps, &env.options, now)
            .await
            .unwrap();

        let mut saw_rebalance = false;
        while let Ok(event) = rx.try_recv() {
            if let EngineEvent::RebalanceExecuted {
                iterations,
                delta_before,
                delta_after,
                ..
            } = event
            {
                assert_eq!(iterations, 1);
                assert_eq!(delta_before, dec!(0));
                assert_eq!(delta_after, dec!(-2));
                saw_rebalance = true;
            }
        }
        assert!(saw_rebalance);
    }

    // ==================== Admin Parameter Tests ====================

    #[test]
    fn set_target_delta_validates_magnitude() {
        let mut env = make_env();
        let err = env
            .controller
            .set_target_delta(dec!(150), Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTargetDelta { target, max }
                if target == dec!(150) && max == dec!(100)
        ));
        assert_eq!(env.controller.target_delta(), Decimal::ZERO);
    }

    #[test]
    fn set_target_delta_publishes_parameter_change() {
        let mut env = make_env();
        let mut rx = env.events.subscribe();
        env.controller.set_target_delta(dec!(-2), Utc::now()).unwrap();
        assert_eq!(env.controller.target_delta(), dec!(-2));

        let event = rx.try_recv().unwrap();
        match event {
            EngineEvent::ParameterChanged {
                parameter,
                old_value,
                new_value,
                ..
            } => {
                assert_eq!(parameter, "target_delta");
                assert_eq!(old_value, "0");
                assert_eq!(new_value, "-2");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn optimal_hedge_ratio_scales_and_clamps() {
        let env = make_env();
        assert_eq!(env.controller.optimal_hedge_ratio(9000, 8000), 7200);
        // floor at the configured minimum
        assert_eq!(env.controller.optimal_hedge_ratio(2000, 2000), 5000);
        // never above full coverage
        assert_eq!(env.controller.optimal_hedge_ratio(12000, 11000), 10000);
    }

    #[test]
    fn snapshot_reflects_controller_state() {
        let mut env = make_env();
        let now = Utc::now();
        env.controller.evaluate(&uniform(dec!(65)), now);
        env.controller.set_target_delta(dec!(-1), now).unwrap();

        let snapshot = env.controller.snapshot(&env.perps, &env.options);
        assert_eq!(snapshot.state, RiskState::Warning);
        assert_eq!(snapshot.score, dec!(65));
        assert_eq!(snapshot.target_delta, dec!(-1));
        assert_eq!(snapshot.current_delta, Decimal::ZERO);
        assert_eq!(snapshot.rebalance_threshold, dec!(0.05));
    }
}
