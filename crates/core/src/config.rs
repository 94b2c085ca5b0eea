//! Engine configuration.
//!
//! All thresholds, limits, and tenors are injected at construction as plain
//! data. Nothing in the engine reads files or the environment; the figment
//! loader in `config_loader` is a convenience for embedding applications.

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub perps: PerpConfig,
    pub options: OptionsConfig,
    pub risk: RiskConfig,
    pub feed: FeedConfig,
    pub keeper: KeeperConfig,
}

/// Perpetual position manager limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerpConfig {
    /// Venues shorts may be opened on.
    pub allowed_venues: Vec<String>,
    /// Leverage is validated against 1..=this.
    pub max_leverage: u32,
    /// Hard cap on caller-supplied slippage tolerance (bps).
    pub max_slippage_cap_bps: u32,
    /// Funding epoch length (seconds). Collection inside the epoch is a no-op.
    pub funding_epoch_secs: u64,
    /// Sanity bound on venue-reported funding rates, as a ratio per epoch.
    pub max_funding_rate: Decimal,
    /// Margin ratio below which emergency top-up fires.
    pub min_margin_ratio: Decimal,
    /// Margin ratio below which a warning is emitted.
    pub warning_margin_ratio: Decimal,
    /// Emergency top-up size as a fraction of position value.
    pub emergency_topup_factor: Decimal,
    /// Liquidation buffer factor k: a short liquidates at entry * (1 + k / leverage).
    pub liq_buffer_factor: Decimal,
}

impl Default for PerpConfig {
    fn default() -> Self {
        Self {
            allowed_venues: vec!["paper".to_string()],
            max_leverage: 10,
            max_slippage_cap_bps: 1000,
            funding_epoch_secs: 8 * 3600,
            max_funding_rate: Decimal::from_str_exact("0.10").unwrap(),
            min_margin_ratio: Decimal::from_str_exact("0.05").unwrap(),
            warning_margin_ratio: Decimal::from_str_exact("0.10").unwrap(),
            emergency_topup_factor: Decimal::from_str_exact("0.02").unwrap(),
            liq_buffer_factor: Decimal::from_str_exact("0.9").unwrap(),
        }
    }
}

impl PerpConfig {
    pub fn funding_epoch(&self) -> Duration {
        Duration::seconds(self.funding_epoch_secs as i64)
    }
}

/// Options overlay limits and the placeholder Greeks model constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsConfig {
    /// Minimum implied volatility (bps) before premium is sold.
    pub min_iv_bps: u32,
    /// Hard cap on the strike discount below mark (bps).
    pub max_strike_offset_bps: u32,
    /// Written option tenor in days.
    pub tenor_days: i64,
    /// Options inside this window of expiry are resolved (seconds).
    pub expiry_window_secs: u64,
    /// Portfolio vega ceiling across all written options.
    pub max_vega_limit: Decimal,
    /// Per-unit vega of a freshly written option (decays with tenor).
    pub vega_base: Decimal,
    /// Theta numerator in the placeholder model.
    pub theta_base: Decimal,
    /// Residual deltas smaller than this are not worth a hedge trade.
    pub min_hedge_size: Decimal,
    /// Underlying units per contract.
    pub contract_multiplier: Decimal,
    /// Default size of a vol sale, in contracts, before vega clipping.
    pub default_sell_quantity: Decimal,
    /// Venue, leverage, and slippage for the per-option delta hedge.
    pub hedge_venue: String,
    pub hedge_leverage: u32,
    pub hedge_slippage_bps: u32,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            min_iv_bps: 6000,
            max_strike_offset_bps: 2000,
            tenor_days: 14,
            expiry_window_secs: 24 * 3600,
            max_vega_limit: Decimal::from(1000),
            vega_base: Decimal::from(25),
            theta_base: Decimal::from_str_exact("0.5").unwrap(),
            min_hedge_size: Decimal::from_str_exact("0.001").unwrap(),
            contract_multiplier: Decimal::ONE,
            default_sell_quantity: Decimal::from(10),
            hedge_venue: "paper".to_string(),
            hedge_leverage: 2,
            hedge_slippage_bps: 200,
        }
    }
}

impl OptionsConfig {
    pub fn tenor(&self) -> Duration {
        Duration::days(self.tenor_days)
    }

    pub fn expiry_window(&self) -> Duration {
        Duration::seconds(self.expiry_window_secs as i64)
    }
}

/// Composite risk score weights, in percent. Must sum to 100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskWeights {
    pub leverage: u32,
    pub liquidity: u32,
    pub drawdown: u32,
    pub correlation: u32,
    pub volatility: u32,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            leverage: 30,
            liquidity: 20,
            drawdown: 25,
            correlation: 10,
            volatility: 15,
        }
    }
}

/// Risk controller thresholds and rebalance bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Composite score at which Normal becomes Warning.
    pub warning_score: Decimal,
    /// Composite score at which Warning becomes Emergency.
    pub emergency_score: Decimal,
    pub weights: RiskWeights,
    /// Delta deviation (underlying units) tolerated before rebalancing.
    pub rebalance_threshold: Decimal,
    /// Minimum seconds between rebalance executions.
    pub min_rebalance_interval_secs: u64,
    /// Compute-act-recheck loop bound.
    pub max_rebalance_iterations: u32,
    /// Magnitude cap on admin-set target delta.
    pub max_target_delta: Decimal,
    /// Floor on the correlation-scaled hedge ratio (bps).
    pub min_hedge_ratio_bps: u32,
    /// Leverage and slippage used for rebalance shorts.
    pub rebalance_leverage: u32,
    pub rebalance_slippage_bps: u32,
    /// Venue rebalance shorts are routed to.
    pub rebalance_venue: String,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            warning_score: Decimal::from(60),
            emergency_score: Decimal::from(80),
            weights: RiskWeights::default(),
            rebalance_threshold: Decimal::from_str_exact("0.05").unwrap(),
            min_rebalance_interval_secs: 3600,
            max_rebalance_iterations: 4,
            max_target_delta: Decimal::from(100),
            min_hedge_ratio_bps: 5000,
            rebalance_leverage: 3,
            rebalance_slippage_bps: 300,
            rebalance_venue: "paper".to_string(),
        }
    }
}

impl RiskConfig {
    pub fn min_rebalance_interval(&self) -> Duration {
        Duration::seconds(self.min_rebalance_interval_secs as i64)
    }
}

/// Price feed freshness gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Asset symbol passed to the feed.
    pub asset: String,
    /// Samples older than this are rejected (seconds).
    pub max_price_age_secs: i64,
    /// Samples below this confidence are rejected (bps).
    pub min_confidence_bps: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            asset: "BTC".to_string(),
            max_price_age_secs: 3600,
            min_confidence_bps: 9500,
        }
    }
}

/// Keeper loop cadence. The engine itself never self-schedules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperConfig {
    pub funding_interval_secs: u64,
    pub greeks_interval_secs: u64,
    pub risk_interval_secs: u64,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            funding_interval_secs: 3600,
            greeks_interval_secs: 300,
            risk_interval_secs: 60,
        }
    }
}
