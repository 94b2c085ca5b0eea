//! Written-put overlay manager.
//!
//! Sells puts only when implied volatility clears the configured floor,
//! keeps portfolio vega inside its limit, and immediately offsets each new
//! position's delta through the perpetual manager. Options and perpetuals
//! are never adjusted independently of each other's delta contribution.

use crate::greeks::PortfolioGreeks;
use crate::model::put_writer_greeks;
use crate::types::{ExpiryResolution, OptionCloseReason, OptionPosition};
use chrono::{DateTime, Utc};
use hedge_core::config::{FeedConfig, OptionsConfig};
use hedge_core::emergency::EmergencySwitch;
use hedge_core::error::{EngineError, Result};
use hedge_core::events::{EngineEvent, EventBus};
use hedge_core::feed::fresh_mark;
use hedge_core::numeric::apply_bps_discount;
use hedge_core::traits::{OptionsVenue, PriceFeed};
use hedge_core::types::{OptionId, VenueId};
use hedge_perps::PerpPositionManager;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct OptionsOverlayManager {
    config: OptionsConfig,
    feed_config: FeedConfig,
    feed: Arc<dyn PriceFeed>,
    execution: Arc<dyn OptionsVenue>,
    emergency: EmergencySwitch,
    events: EventBus,
    options: BTreeMap<OptionId, OptionPosition>,
    next_id: u64,
}

impl OptionsOverlayManager {
    pub fn new(
        config: OptionsConfig,
        feed_config: FeedConfig,
        feed: Arc<dyn PriceFeed>,
        execution: Arc<dyn OptionsVenue>,
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
            options: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Writes puts `strike_offset_bps` below the current mark and hedges
    /// the resulting delta through `perps`.
    ///
    /// The quantity starts from the configured default and is clipped to
    /// whatever vega headroom remains. The venue sale must confirm before
    /// any record exists; the hedge is a second venue operation and a
    /// failure there surfaces after the option is already on the book.
    ///
    /// # Errors
    ///
    /// `IvBelowThreshold` is the selectivity gate: no position is created
    /// when the venue's implied volatility is under the floor.
    /// `VegaLimitExceeded` when no vega headroom remains,
    /// `InvalidStrikeOffset` past the cap, `EmergencyModeBlocked` while the
    /// switch is engaged, and collaborator errors for feed or venue
    /// failures.
    pub async fn sell_vol(
        &mut self,
        strike_offset_bps: u32,
        perps: &mut PerpPositionManager,
        now: DateTime<Utc>,
    ) -> Result<OptionId> {
        self.emergency.guard("sell_vol")?;
        if strike_offset_bps > self.config.max_strike_offset_bps {
            return Err(EngineError::InvalidStrikeOffset {
                offset_bps: strike_offset_bps,
                cap_bps: self.config.max_strike_offset_bps,
            });
        }

        let iv_bps = self
            .execution
            .implied_volatility()
            .await
            .map_err(|e| EngineError::venue_call("sell_vol", e))?;
        if iv_bps < self.config.min_iv_bps {
            debug!(
                iv_bps,
                threshold_bps = self.config.min_iv_bps,
                "implied volatility under floor, not selling"
            );
            return Err(EngineError::IvBelowThreshold {
                current_bps: iv_bps,
                threshold_bps: self.config.min_iv_bps,
            });
        }

        let mark = fresh_mark(self.feed.as_ref(), &self.feed_config, "sell_vol", now).await?;
        let strike = apply_bps_discount(mark, strike_offset_bps);
        let expiry = now + self.config.tenor();
        let greeks = put_writer_greeks(mark, strike, self.config.tenor(), &self.config);

        // Size to remaining vega headroom.
        let current_vega = self.portfolio_greeks().vega;
        let headroom = self.config.max_vega_limit - current_vega;
        if headroom <= Decimal::ZERO {
            return Err(EngineError::VegaLimitExceeded {
                current: current_vega,
                limit: self.config.max_vega_limit,
            });
        }
        let mut quantity = self.config.default_sell_quantity;
        if greeks.vega > Decimal::ZERO {
            quantity = quantity.min(headroom / greeks.vega);
        }
        if quantity <= Decimal::ZERO {
            return Err(EngineError::VegaLimitExceeded {
                current: current_vega,
                limit: self.config.max_vega_limit,
            });
        }

        let premium = self
            .execution
            .sell_put(strike, expiry, quantity)
            .await
            .map_err(|e| EngineError::venue_call("sell_vol", e))?;

        let id = OptionId::new(self.next_id);
        self.next_id += 1;
        self.options.insert(
            id,
            OptionPosition {
                id,
                strike,
                expiry,
                quantity,
                premium_collected: premium,
                greeks,
                opened_at: now,
                active: true,
                close_reason: None,
                realized_pnl: None,
            },
        );

        info!(
            option_id = %id,
            strike = %strike,
            expiry = %expiry,
            quantity = %quantity,
            premium = %premium,
            iv_bps,
            "sold put premium"
        );
        self.events.publish(EngineEvent::OptionSold {
            option_id: id,
            strike,
            expiry,
            quantity,
            premium,
            iv_bps,
            timestamp: now,
        });

        self.hedge_option_delta(id, perps, now).await?;

        Ok(id)
    }

    /// Offsets one option's delta contribution with short perpetual
    /// exposure. No-op when the residual is below the tradeable minimum.
    ///
    /// # Errors
    ///
    /// `OptionNotFound` / `OptionInactive`, plus whatever the perp open
    /// surfaces.
    pub async fn hedge_option_delta(
        &mut self,
        option_id: OptionId,
        perps: &mut PerpPositionManager,
        now: DateTime<Utc>,
    ) -> Result<Decimal> {
        let residual = {
            let position = self
                .options
                .get(&option_id)
                .ok_or(EngineError::OptionNotFound(option_id))?;
            if !position.active {
                return Err(EngineError::OptionInactive(option_id));
            }
            position.greeks.delta * position.quantity * self.config.contract_multiplier
        };

        if residual.abs() < self.config.min_hedge_size {
            debug!(option_id = %option_id, residual = %residual, "residual below hedge minimum");
            return Ok(Decimal::ZERO);
        }
        if residual.is_sign_negative() {
            // Written puts carry positive writer delta; a negative residual
            // means shorts must shrink, which the rebalance loop owns.
            debug!(option_id = %option_id, residual = %residual, "negative residual left to rebalance");
            return Ok(Decimal::ZERO);
        }

        perps
            .open_short(
                VenueId::new(self.config.hedge_venue.clone()),
                residual,
                self.config.hedge_leverage,
                self.config.hedge_slippage_bps,
                now,
            )
            .await?;

        info!(option_id = %option_id, hedged_delta = %residual, "hedged option delta");
        self.events.publish(EngineEvent::DeltaHedged {
            option_id,
            hedged_delta: residual,
            timestamp: now,
        });

        Ok(residual)
    }

    /// Re-marks every active option's per-unit Greeks from the current
    /// mark and time to expiry, then returns the fresh portfolio snapshot.
    ///
    /// # Errors
    ///
    /// Feed failures only; the book is untouched when the mark is refused.
    pub async fn refresh_greeks(&mut self, now: DateTime<Utc>) -> Result<PortfolioGreeks> {
        let mark = fresh_mark(self.feed.as_ref(), &self.feed_config, "refresh_greeks", now).await?;

        for position in self.options.values_mut().filter(|p| p.active) {
            position.greeks = put_writer_greeks(
                mark,
                position.strike,
                position.expiry - now,
                &self.config,
            );
        }

        let snapshot = self.portfolio_greeks();
        debug!(
            delta = %snapshot.delta,
            gamma = %snapshot.gamma,
            vega = %snapshot.vega,
            theta = %snapshot.theta,
            "refreshed greeks"
        );
        self.events.publish(EngineEvent::GreeksRefreshed {
            delta: snapshot.delta,
            gamma: snapshot.gamma,
            vega: snapshot.vega,
            theta: snapshot.theta,
            timestamp: now,
        });

        Ok(snapshot)
    }

    /// Resolves every active option inside the expiry window.
    ///
    /// In-the-money puts are bought back to dodge assignment; the rest are
    /// left to expire and keep their full premium. Each resolution commits
    /// individually, so a venue failure part-way leaves earlier
    /// resolutions in place and later options still active for the next
    /// sweep. Re-running the sweep never re-resolves anything.
    ///
    /// # Errors
    ///
    /// Feed failures before any resolution; venue failures mid-sweep.
    pub async fn manage_expiries(&mut self, now: DateTime<Utc>) -> Result<Vec<ExpiryResolution>> {
        let mark = fresh_mark(self.feed.as_ref(), &self.feed_config, "manage_expiries", now).await?;
        let window = self.config.expiry_window();

        let due: Vec<OptionId> = self
            .options
            .values()
            .filter(|p| p.active && p.time_to_expiry(now) < window)
            .map(|p| p.id)
            .collect();

        let mut resolutions = Vec::with_capacity(due.len());
        for option_id in due {
            let (itm, quantity, premium) = {
                let position = self
                    .options
                    .get(&option_id)
                    .ok_or(EngineError::OptionNotFound(option_id))?;
                (position.is_itm(mark), position.quantity, position.premium_collected)
            };

            let (reason, pnl) = if itm {
                let cost = self
                    .execution
                    .buy_back(option_id.as_u64(), quantity)
                    .await
                    .map_err(|e| EngineError::venue_call("manage_expiries", e))?;
                let pnl = premium - cost;
                warn!(
                    option_id = %option_id,
                    mark = %mark,
                    buyback_cost = %cost,
                    realized_pnl = %pnl,
                    "bought back in-the-money put ahead of expiry"
                );
                self.events.publish(EngineEvent::OptionClosed {
                    option_id,
                    buyback_cost: cost,
                    realized_pnl: pnl,
                    timestamp: now,
                });
                (OptionCloseReason::EarlyClose, pnl)
            } else {
                info!(option_id = %option_id, realized_pnl = %premium, "put expired worthless, premium kept");
                self.events.publish(EngineEvent::OptionExpired {
                    option_id,
                    realized_pnl: premium,
                    timestamp: now,
                });
                (OptionCloseReason::Expired, premium)
            };

            if let Some(position) = self.options.get_mut(&option_id) {
                position.active = false;
                position.close_reason = Some(reason);
                position.realized_pnl = Some(pnl);
            }
            resolutions.push(ExpiryResolution {
                option_id,
                reason,
                realized_pnl: pnl,
            });
        }

        Ok(resolutions)
    }

    /// Engages the emergency switch and unwinds every active option.
    ///
    /// Serves both manual admin shutdown and the final step of a
    /// risk-triggered one. Closes commit per position; a buyback failure
    /// leaves earlier closes done and the failing option active.
    ///
    /// # Errors
    ///
    /// Venue failures mid-unwind.
    pub async fn emergency_close_all(
        &mut self,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Decimal> {
        if !self.emergency.is_engaged() {
            self.emergency.engage();
            warn!(reason, "emergency switch engaged, unwinding options overlay");
            self.events.publish(EngineEvent::EmergencyActivated {
                reason: reason.to_string(),
                timestamp: now,
            });
        }

        let active: Vec<OptionId> = self
            .options
            .values()
            .filter(|p| p.active)
            .map(|p| p.id)
            .collect();

        let mut total_pnl = Decimal::ZERO;
        for option_id in active {
            let (quantity, premium) = {
                let position = self
                    .options
                    .get(&option_id)
                    .ok_or(EngineError::OptionNotFound(option_id))?;
                (position.quantity, position.premium_collected)
            };
            let cost = self
                .execution
                .buy_back(option_id.as_u64(), quantity)
                .await
                .map_err(|e| EngineError::venue_call("emergency_close_all", e))?;
            let pnl = premium - cost;
            total_pnl += pnl;

            if let Some(position) = self.options.get_mut(&option_id) {
                position.active = false;
                position.close_reason = Some(OptionCloseReason::Emergency);
                position.realized_pnl = Some(pnl);
            }
            self.events.publish(EngineEvent::OptionClosed {
                option_id,
                buyback_cost: cost,
                realized_pnl: pnl,
                timestamp: now,
            });
        }

        info!(total_realized_pnl = %total_pnl, "options overlay unwound");
        Ok(total_pnl)
    }

    /// Aggregate Greeks over the active book, recomputed on every call.
    pub fn portfolio_greeks(&self) -> PortfolioGreeks {
        PortfolioGreeks::from_positions(self.options.values())
    }

    /// Option delta contribution in underlying units, writer-signed.
    pub fn delta_exposure(&self) -> Decimal {
        self.portfolio_greeks()
            .delta_exposure(self.config.contract_multiplier)
    }

    pub fn get_option(&self, option_id: OptionId) -> Option<&OptionPosition> {
        self.options.get(&option_id)
    }

    pub fn active_options(&self) -> Vec<&OptionPosition> {
        self.options.values().filter(|p| p.active).collect()
    }

    pub fn total_premium_collected(&self) -> Decimal {
        self.options.values().map(|p| p.premium_collected).sum()
    }
}
