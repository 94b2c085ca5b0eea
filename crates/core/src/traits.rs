use crate::types::{PriceSample, VenueFill, VenueId};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Source of marks for the hedged asset.
///
/// Implementations aggregate however they like; the engine only checks the
/// returned sample's age and confidence before trusting it.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn get_price(&self, asset: &str) -> Result<PriceSample>;
}

/// Perpetual futures execution venue.
///
/// Calls are fire-and-confirm: the engine writes no position state unless
/// the call returns a fill. Retry policy belongs to the implementation or
/// the caller, never to the engine.
#[async_trait]
pub trait PerpVenue: Send + Sync {
    async fn open_short(
        &self,
        venue: &VenueId,
        size: Decimal,
        leverage: u32,
        max_slippage_bps: u32,
    ) -> Result<VenueFill>;

    async fn close_position(&self, venue: &VenueId, size: Decimal) -> Result<VenueFill>;

    /// Current funding rate for one epoch, as a signed ratio.
    async fn funding_rate(&self, venue: &VenueId) -> Result<Decimal>;
}

/// Options execution venue for the written-put overlay.
#[async_trait]
pub trait OptionsVenue: Send + Sync {
    /// Writes puts; returns the total premium collected.
    async fn sell_put(
        &self,
        strike: Decimal,
        expiry: DateTime<Utc>,
        quantity: Decimal,
    ) -> Result<Decimal>;

    /// Buys back a written position; returns the total cost.
    async fn buy_back(&self, option_ref: u64, quantity: Decimal) -> Result<Decimal>;

    /// Current at-the-money implied volatility in basis points.
    async fn implied_volatility(&self) -> Result<u32>;
}
