//! Short perpetual position manager.
//!
//! Owns every perpetual record exclusively. All mutating entry points take
//! `&mut self` and a caller-supplied `now`, so the embedding layer controls
//! both serialization and the clock. Venue and feed calls happen before any
//! state is written; a failed call leaves the book exactly as it was.

use crate::position::{MarginHealth, PerpPosition};
use chrono::{DateTime, Utc};
use hedge_core::config::{FeedConfig, PerpConfig};
use hedge_core::emergency::EmergencySwitch;
use hedge_core::error::{EngineError, Result};
use hedge_core::events::{EngineEvent, EventBus};
use hedge_core::feed::fresh_mark;
use hedge_core::numeric::normalize_zero;
use hedge_core::traits::{PerpVenue, PriceFeed};
use hedge_core::types::{PositionId, VenueId};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct PerpPositionManager {
    config: PerpConfig,
    feed_config: FeedConfig,
    feed: Arc<dyn PriceFeed>,
    execution: Arc<dyn PerpVenue>,
    emergency: EmergencySwitch,
    events: EventBus,
    positions: BTreeMap<PositionId, PerpPosition>,
    next_id: u64,
    last_funding_at: Option<DateTime<Utc>>,
}

impl PerpPositionManager {
    pub fn new(
        config: PerpConfig,
        feed_config: FeedConfig,
        feed: Arc<dyn PriceFeed>,
        execution: Arc<dyn PerpVenue>,
        emergency: EmergencySwitch,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            feed_config,
            feed,
            execution,
            emergency,
            events,
            positions: BTreeMap::new(),
            next_id: 1,
            last_funding_at: None,
        }
    }

    /// Opens a new short of `size` underlying units on `venue`.
    ///
    /// The position record carries the size negated; margin is
    /// `size * entry / leverage` and the liquidation price sits a
    /// leverage-scaled buffer above entry.
    ///
    /// # Errors
    ///
    /// Precondition errors for a bad venue, size, leverage, or slippage;
    /// `EmergencyModeBlocked` while the switch is engaged; feed and venue
    /// failures surface as collaborator errors.
    pub async fn open_short(
        &mut self,
        venue: VenueId,
        size: Decimal,
        leverage: u32,
        max_slippage_bps: u32,
        now: DateTime<Utc>,
    ) -> Result<PositionId> {
        self.emergency.guard("open_short")?;
        if !self.config.allowed_venues.iter().any(|v| v == venue.as_str()) {
            return Err(EngineError::UnauthorizedVenue { venue });
        }
        if size <= Decimal::ZERO {
            return Err(EngineError::InvalidSize { size });
        }
        if leverage == 0 || leverage > self.config.max_leverage {
            return Err(EngineError::InvalidLeverage {
                leverage,
                max: self.config.max_leverage,
            });
        }
        if max_slippage_bps > self.config.max_slippage_cap_bps {
            return Err(EngineError::InvalidSlippage {
                slippage_bps: max_slippage_bps,
                cap_bps: self.config.max_slippage_cap_bps,
            });
        }

        // Gate on feed health before touching the venue.
        fresh_mark(self.feed.as_ref(), &self.feed_config, "open_short", now).await?;

        let fill = self
            .execution
            .open_short(&venue, size, leverage, max_slippage_bps)
            .await
            .map_err(|e| EngineError::venue_call("open_short", e))?;

        let entry_price = fill.fill_price;
        let margin = size * entry_price / Decimal::from(leverage);
        let liquidation_price =
            entry_price * (Decimal::ONE + self.config.liq_buffer_factor / Decimal::from(leverage));

        let id = PositionId::new(self.next_id);
        self.next_id += 1;
        let position = PerpPosition {
            id,
            venue: venue.clone(),
            size: -size,
            entry_price,
            leverage,
            margin,
            funding_accrued: Decimal::ZERO,
            liquidation_price,
            opened_at: now,
            active: true,
            realized_pnl: None,
        };
        self.positions.insert(id, position);

        info!(
            position_id = %id,
            venue = %venue,
            size = %size,
            entry_price = %entry_price,
            leverage,
            margin = %margin,
            "opened short perpetual"
        );
        self.events.publish(EngineEvent::PositionOpened {
            position_id: id,
            venue,
            size: -size,
            entry_price,
            leverage,
            margin,
            timestamp: now,
        });

        Ok(id)
    }

    /// Closes an active position at the venue and realizes PnL.
    ///
    /// Permitted during Emergency; closing only reduces risk.
    ///
    /// # Errors
    ///
    /// `PositionNotFound` / `PositionInactive`, plus feed and venue
    /// failures. A venue failure leaves the position open and unchanged.
    pub async fn close(&mut self, position_id: PositionId, now: DateTime<Utc>) -> Result<Decimal> {
        let (venue, size) = {
            let position = self
                .positions
                .get(&position_id)
                .ok_or(EngineError::PositionNotFound(position_id))?;
            if !position.active {
                return Err(EngineError::PositionInactive(position_id));
            }
            (position.venue.clone(), position.size)
        };

        fresh_mark(self.feed.as_ref(), &self.feed_config, "close", now).await?;

        let fill = self
            .execution
            .close_position(&venue, size.abs())
            .await
            .map_err(|e| EngineError::venue_call("close", e))?;
        let exit_price = fill.fill_price;

        // Guards above make the lookup infallible here.
        let position = self
            .positions
            .get_mut(&position_id)
            .ok_or(EngineError::PositionNotFound(position_id))?;
        let pnl = position.close_pnl(exit_price);
        position.active = false;
        position.realized_pnl = Some(pnl);

        info!(
            position_id = %position_id,
            exit_price = %exit_price,
            realized_pnl = %pnl,
            "closed short perpetual"
        );
        self.events.publish(EngineEvent::PositionClosed {
            position_id,
            exit_price,
            realized_pnl: pnl,
            timestamp: now,
        });

        Ok(pnl)
    }

    /// Accrues one funding epoch across all active positions.
    ///
    /// Re-entrant-safe: a call inside the current epoch returns zero and
    /// changes nothing. Rates for every venue are read and validated before
    /// any accrual is committed, so a failure mid-read is all-or-nothing.
    ///
    /// Shorts receive funding when the rate is positive, so the accrual for
    /// a position is simply `rate * |size|`.
    ///
    /// # Errors
    ///
    /// `InvalidFundingRate` when a venue reports a rate beyond the sanity
    /// bound; venue failures surface as collaborator errors.
    pub async fn collect_funding(&mut self, now: DateTime<Utc>) -> Result<Decimal> {
        if let Some(last) = self.last_funding_at {
            if now - last < self.config.funding_epoch() {
                debug!(last_funding_at = %last, "funding epoch not elapsed, no-op");
                return Ok(Decimal::ZERO);
            }
        }

        let active: Vec<(PositionId, VenueId, Decimal)> = self
            .positions
            .values()
            .filter(|p| p.active)
            .map(|p| (p.id, p.venue.clone(), p.size.abs()))
            .collect();

        // Read phase: fetch and validate every rate before committing.
        let mut rates: BTreeMap<VenueId, Decimal> = BTreeMap::new();
        for (_, venue, _) in &active {
            if rates.contains_key(venue) {
                continue;
            }
            let rate = self
                .execution
                .funding_rate(venue)
                .await
                .map_err(|e| EngineError::venue_call("collect_funding", e))?;
            if rate.abs() > self.config.max_funding_rate {
                return Err(EngineError::InvalidFundingRate {
                    venue: venue.clone(),
                    rate,
                });
            }
            rates.insert(venue.clone(), rate);
        }

        // Commit phase.
        let mut total = Decimal::ZERO;
        for (id, venue, magnitude) in &active {
            let accrual = rates[venue] * *magnitude;
            if let Some(position) = self.positions.get_mut(id) {
                position.funding_accrued += accrual;
                total += accrual;
            }
        }
        total = normalize_zero(total);
        self.last_funding_at = Some(now);

        info!(total = %total, positions = active.len(), "collected funding");
        self.events.publish(EngineEvent::FundingCollected {
            total,
            positions: active.len(),
            timestamp: now,
        });

        Ok(total)
    }

    /// Checks one position's margin ratio against the configured tiers.
    ///
    /// Below the minimum ratio an emergency top-up sized as a fraction of
    /// position value is injected immediately; in the warning band only a
    /// signal is emitted.
    ///
    /// # Errors
    ///
    /// `PositionNotFound` / `PositionInactive`, plus feed failures.
    pub async fn monitor_health(
        &mut self,
        position_id: PositionId,
        now: DateTime<Utc>,
    ) -> Result<MarginHealth> {
        let mark = fresh_mark(self.feed.as_ref(), &self.feed_config, "monitor_health", now).await?;

        let min_ratio = self.config.min_margin_ratio;
        let warning_ratio = self.config.warning_margin_ratio;
        let topup_factor = self.config.emergency_topup_factor;

        let position = self
            .positions
            .get_mut(&position_id)
            .ok_or(EngineError::PositionNotFound(position_id))?;
        if !position.active {
            return Err(EngineError::PositionInactive(position_id));
        }

        let margin_ratio = position.margin_ratio(mark);
        if margin_ratio < min_ratio {
            let amount = topup_factor * position.notional(mark);
            position.margin += amount;
            warn!(
                position_id = %position_id,
                margin_ratio = %margin_ratio,
                amount = %amount,
                "margin below minimum, injected emergency top-up"
            );
            self.events.publish(EngineEvent::MarginToppedUp {
                position_id,
                amount,
                margin_ratio,
                timestamp: now,
            });
            return Ok(MarginHealth::ToppedUp {
                margin_ratio,
                amount,
            });
        }
        if margin_ratio < warning_ratio {
            warn!(
                position_id = %position_id,
                margin_ratio = %margin_ratio,
                "margin ratio in warning band"
            );
            self.events.publish(EngineEvent::MarginWarning {
                position_id,
                margin_ratio,
                timestamp: now,
            });
            return Ok(MarginHealth::Warning { margin_ratio });
        }
        Ok(MarginHealth::Healthy)
    }

    /// Net signed perpetual exposure, summed over active positions.
    ///
    /// Recomputed from the book on every call; nothing patches a running
    /// total anywhere.
    pub fn perp_delta(&self) -> Decimal {
        normalize_zero(
            self.positions
                .values()
                .filter(|p| p.active)
                .map(|p| p.size)
                .sum(),
        )
    }

    pub fn get_position(&self, position_id: PositionId) -> Option<&PerpPosition> {
        self.positions.get(&position_id)
    }

    pub fn active_positions(&self) -> Vec<&PerpPosition> {
        self.positions.values().filter(|p| p.active).collect()
    }

    pub fn total_margin(&self) -> Decimal {
        self.positions
            .values()
            .filter(|p| p.active)
            .map(|p| p.margin)
            .sum()
    }

    pub fn total_funding_accrued(&self) -> Decimal {
        normalize_zero(self.positions.values().map(|p| p.funding_accrued).sum())
    }

    pub fn last_funding_at(&self) -> Option<DateTime<Utc>> {
        self.last_funding_at
    }
}
