//! End-to-end tests for the hedging engine.
//!
//! These cover the full flows the unit tests only exercise piecewise:
//! - a complete hedging lifecycle: short, overlay sale with auto-hedge,
//!   funding, greek refresh under a price move, rebalance, expiry
//! - the emergency path from a risk score breach through unwind and reset
//! - the actor round-trip with snapshot and event channels
//! - keeper-driven rebalancing against live intervals

use hedge_core::config::{EngineConfig, KeeperConfig};
use hedge_core::error::EngineError;
use hedge_core::events::EngineEvent;
use hedge_core::types::VenueId;
use hedge_engine::{spawn_engine, HedgeEngine, Keeper};
use hedge_options::OptionCloseReason;
use hedge_paper::{PaperOptionsVenue, PaperPerpVenue, PaperPriceFeed};
use hedge_risk::{RebalanceOutcome, RiskInputs, RiskState};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Helpers
// =============================================================================

struct TestRig {
    engine: HedgeEngine,
    feed: PaperPriceFeed,
    perp_venue: PaperPerpVenue,
    options_venue: PaperOptionsVenue,
}

fn make_rig() -> TestRig {
    let feed = PaperPriceFeed::new(dec!(50000));
    let perp_venue = PaperPerpVenue::new(dec!(50000));
    let options_venue = PaperOptionsVenue::default();
    let engine = HedgeEngine::new(
        EngineConfig::default(),
        Arc::new(feed.clone()),
        Arc::new(perp_venue.clone()),
        Arc::new(options_venue.clone()),
    );
    TestRig {
        engine,
        feed,
        perp_venue,
        options_venue,
    }
}

fn severe_inputs() -> RiskInputs {
    RiskInputs {
        leverage_ratio: dec!(90),
        liquidity_ratio: dec!(90),
        drawdown: dec!(90),
        correlation: dec!(90),
        realized_volatility: dec!(90),
    }
}

// =============================================================================
// Test 1: Full Hedging Lifecycle
// =============================================================================

/// Walks one position through the whole strategy: a base short hedging an
/// external spot bag, premium sold on top with its delta auto-hedged,
/// funding collected once per epoch, greeks re-marked after a drawdown,
/// the rebalance loop restoring the target, and the put bought back ahead
/// of an in-the-money expiry.
#[tokio::test]
async fn full_hedging_lifecycle() {
    let mut rig = make_rig();
    let now = chrono::Utc::now();

    // Hedge a notional 2 BTC spot bag: target delta -2, matching short.
    rig.engine.set_target_delta(dec!(-2), now).unwrap();
    rig.engine
        .open_short(VenueId::new("paper"), dec!(2), 5, 300, now)
        .await
        .unwrap();
    assert_eq!(rig.engine.current_delta(), dec!(-2));
    assert_eq!(rig.engine.total_margin(), dec!(20000));

    // Sell 10 puts 500 bps under the mark. The 1.0 delta they add is
    // hedged automatically, so net delta stays on target.
    let option_id = rig.engine.sell_vol(500, now).await.unwrap();
    let option = rig.engine.get_option(option_id).unwrap();
    assert_eq!(option.strike, dec!(47500));
    assert_eq!(option.premium_collected, dec!(1200));
    assert_eq!(rig.engine.current_delta(), dec!(-2));
    assert_eq!(rig.engine.active_positions().len(), 2);

    // First funding pass accrues on both shorts at the default rate.
    let funding = rig.engine.collect_funding(now).await.unwrap();
    assert_eq!(funding, dec!(0.0003));
    assert_eq!(rig.engine.total_funding_accrued(), dec!(0.0003));

    // A second pass inside the epoch changes nothing.
    let repeat = rig
        .engine
        .collect_funding(now + chrono::Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(repeat, Decimal::ZERO);
    assert_eq!(rig.engine.total_funding_accrued(), dec!(0.0003));

    // Fresh book: full tenor left, so per-unit vega is at its base.
    let greeks = rig.engine.refresh_greeks(now).await.unwrap();
    assert_eq!(greeks.delta, dec!(1.0));
    assert_eq!(greeks.vega, dec!(250));

    // On target, so the rebalance loop has nothing to do.
    let outcome = rig.engine.execute_rebalance(now).await.unwrap();
    assert_eq!(outcome, RebalanceOutcome::NotNeeded);

    // Mark drops through the strike: written puts go deep in the money
    // and their delta swells from 0.10 to 0.90 per unit.
    let after_drop = now + chrono::Duration::hours(1);
    rig.feed.set_price(dec!(44000));
    rig.feed.set_timestamp(after_drop);
    rig.engine.refresh_greeks(after_drop).await.unwrap();
    assert_eq!(rig.engine.portfolio_greeks().delta, dec!(9.0));
    assert_eq!(rig.engine.current_delta(), dec!(6));

    // One corrective short restores the target.
    let outcome = rig.engine.execute_rebalance(after_drop).await.unwrap();
    assert_eq!(
        outcome,
        RebalanceOutcome::Completed {
            iterations: 1,
            delta_before: dec!(6),
            delta_after: dec!(-2),
        }
    );
    assert_eq!(rig.engine.current_delta(), dec!(-2));
    assert_eq!(rig.engine.snapshot().rebalance_count, 1);

    // An hour before expiry the put is still in the money, so the sweep
    // buys it back rather than risk assignment.
    let near_expiry = now + chrono::Duration::days(14) - chrono::Duration::hours(1);
    rig.feed.set_timestamp(near_expiry);
    let resolutions = rig.engine.manage_expiries(near_expiry).await.unwrap();
    assert_eq!(resolutions.len(), 1);
    assert_eq!(resolutions[0].reason, OptionCloseReason::EarlyClose);
    assert_eq!(resolutions[0].realized_pnl, dec!(800));
    assert_eq!(rig.options_venue.buyback_calls(), 1);

    assert!(rig.engine.active_options().is_empty());
    assert_eq!(rig.engine.total_premium_collected(), dec!(1200));
    assert_eq!(rig.engine.portfolio_greeks().delta, Decimal::ZERO);
}

// =============================================================================
// Test 2: Emergency Flow
// =============================================================================

/// A composite score breach must unwind the overlay exactly once, block
/// everything risk-increasing while leaving closes available, and hand
/// back a working engine after the manual reset.
#[tokio::test]
async fn risk_breach_unwinds_overlay_and_blocks_new_risk() {
    let mut rig = make_rig();
    let now = chrono::Utc::now();

    rig.engine.sell_vol(500, now).await.unwrap();
    assert_eq!(rig.engine.active_options().len(), 1);

    // Telemetry breaches the emergency threshold.
    rig.engine.update_risk_inputs(severe_inputs());
    let state = rig.engine.risk_tick(now).await.unwrap();
    assert_eq!(state, RiskState::Emergency);
    assert!(rig.engine.is_emergency());

    // Overlay unwound at the buyback cost.
    assert!(rig.engine.active_options().is_empty());
    assert_eq!(rig.options_venue.buyback_calls(), 1);

    // Risk-increasing operations refuse.
    let err = rig.engine.sell_vol(500, now).await.unwrap_err();
    assert!(matches!(err, EngineError::EmergencyModeBlocked { .. }));
    let err = rig
        .engine
        .open_short(VenueId::new("paper"), dec!(1), 3, 300, now)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::EmergencyModeBlocked { .. }));

    // Closing the leftover hedge short still works.
    let hedge_id = rig.engine.active_positions()[0].id;
    rig.engine.close_position(hedge_id, now).await.unwrap();
    assert!(rig.engine.active_positions().is_empty());

    // Emergency is sticky and the unwind does not repeat.
    let state = rig.engine.risk_tick(now).await.unwrap();
    assert_eq!(state, RiskState::Emergency);
    assert_eq!(rig.options_venue.buyback_calls(), 1);

    // Manual reset reopens the engine for business.
    rig.engine.reset_emergency(now);
    assert!(!rig.engine.is_emergency());
    rig.engine.sell_vol(500, now).await.unwrap();
    assert_eq!(rig.options_venue.sell_calls(), 2);

    let closed_option = rig
        .engine
        .get_option(hedge_core::types::OptionId::new(1))
        .unwrap();
    assert_eq!(closed_option.close_reason, Some(OptionCloseReason::Emergency));
}

// =============================================================================
// Test 3: Actor Round-Trip
// =============================================================================

/// Commands through the handle must reach the engine in order, publish
/// events on the broadcast bus, and keep the watch snapshot current.
#[tokio::test]
async fn actor_processes_commands_and_publishes_snapshots() {
    let rig = make_rig();
    let (handle, join) = spawn_engine(rig.engine, 32);
    let mut events = handle.subscribe_events();

    handle.set_target_delta(dec!(-2)).await.unwrap();
    let position_id = handle
        .open_short(VenueId::new("paper"), dec!(2), 5, 300)
        .await
        .unwrap();

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, RiskState::Normal);
    assert_eq!(snapshot.target_delta, dec!(-2));
    assert_eq!(snapshot.current_delta, dec!(-2));

    // Events arrive in command order.
    let first = events.recv().await.unwrap();
    assert!(matches!(first, EngineEvent::ParameterChanged { .. }));
    let second = events.recv().await.unwrap();
    match second {
        EngineEvent::PositionOpened {
            position_id: opened,
            size,
            ..
        } => {
            assert_eq!(opened, position_id);
            assert_eq!(size, dec!(-2));
        }
        other => panic!("unexpected event {other:?}"),
    }

    // Errors cross the reply channel intact.
    let err = handle
        .open_short(VenueId::new("unknown"), dec!(1), 3, 300)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown"));

    // A second handle observes the same snapshot stream.
    let other_handle = handle.clone();
    handle.close_position(position_id).await.unwrap();
    assert_eq!(handle.snapshot().current_delta, Decimal::ZERO);
    assert_eq!(other_handle.snapshot().current_delta, Decimal::ZERO);

    handle.shutdown().await.unwrap();
    join.await.unwrap();
    assert!(handle.is_closed());
}

// =============================================================================
// Test 4: Keeper-Driven Rebalance
// =============================================================================

/// The keeper's risk loop must pick up a deviation on its own and run
/// exactly one acting rebalance inside the minimum interval.
#[tokio::test]
async fn keeper_rebalances_without_manual_ticks() {
    let rig = make_rig();
    let (mut handle, _join) = spawn_engine(rig.engine, 32);
    let keeper = Keeper::new(
        handle.clone(),
        KeeperConfig {
            funding_interval_secs: 3600,
            greeks_interval_secs: 3600,
            risk_interval_secs: 1,
        },
    );
    let _tasks = keeper.spawn();

    handle.set_target_delta(dec!(-2)).await.unwrap();

    let snapshot = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let snapshot = handle.snapshot();
            if snapshot.rebalance_count >= 1 {
                return snapshot;
            }
            handle.snapshot_changed().await.unwrap();
        }
    })
    .await
    .expect("keeper should rebalance inside the deadline");

    assert_eq!(snapshot.rebalance_count, 1);
    assert_eq!(snapshot.current_delta, dec!(-2));
    assert_eq!(rig.perp_venue.open_calls(), 1);

    handle.shutdown().await.unwrap();
}
