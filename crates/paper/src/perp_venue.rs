use anyhow::{bail, Result};
use async_trait::async_trait;
use hedge_core::traits::PerpVenue;
use hedge_core::types::{VenueFill, VenueId};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
struct PerpVenueState {
    fill_price: Decimal,
    fee_rate: Decimal,
    default_funding_rate: Decimal,
    funding_rates: HashMap<String, Decimal>,
    open_calls: u32,
    close_calls: u32,
    fail_open: bool,
    fail_close: bool,
}

/// Simulated perpetual venue. Fills are immediate at the configured price
/// with a flat fee rate; funding rates are settable per venue name.
#[derive(Debug, Clone)]
pub struct PaperPerpVenue {
    state: Arc<RwLock<PerpVenueState>>,
}

impl PaperPerpVenue {
    #[must_use]
    pub fn new(fill_price: Decimal) -> Self {
        Self {
            state: Arc::new(RwLock::new(PerpVenueState {
                fill_price,
                fee_rate: Decimal::ZERO,
                default_funding_rate: dec!(0.0001),
                funding_rates: HashMap::new(),
                open_calls: 0,
                close_calls: 0,
                fail_open: false,
                fail_close: false,
            })),
        }
    }

    pub fn set_fill_price(&self, price: Decimal) {
        self.state.write().fill_price = price;
    }

    pub fn set_fee_rate(&self, rate: Decimal) {
        self.state.write().fee_rate = rate;
    }

    pub fn set_funding_rate(&self, venue: &VenueId, rate: Decimal) {
        self.state
            .write()
            .funding_rates
            .insert(venue.as_str().to_string(), rate);
    }

    pub fn set_default_funding_rate(&self, rate: Decimal) {
        self.state.write().default_funding_rate = rate;
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state.write().fail_open = fail;
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.state.write().fail_close = fail;
    }

    #[must_use]
    pub fn open_calls(&self) -> u32 {
        self.state.read().open_calls
    }

    #[must_use]
    pub fn close_calls(&self) -> u32 {
        self.state.read().close_calls
    }
}

impl Default for PaperPerpVenue {
    fn default() -> Self {
        Self::new(dec!(50000))
    }
}

#[async_trait]
impl PerpVenue for PaperPerpVenue {
    async fn open_short(
        &self,
        _venue: &VenueId,
        size: Decimal,
        _leverage: u32,
        _max_slippage_bps: u32,
    ) -> Result<VenueFill> {
        let mut state = self.state.write();
        if state.fail_open {
            bail!("paper venue configured to fail opens");
        }
        state.open_calls += 1;
        Ok(VenueFill {
            fill_price: state.fill_price,
            filled_size: size,
            fee: state.fill_price * size.abs() * state.fee_rate,
        })
    }

    async fn close_position(&self, _venue: &VenueId, size: Decimal) -> Result<VenueFill> {
        let mut state = self.state.write();
        if state.fail_close {
            bail!("paper venue configured to fail closes");
        }
        state.close_calls += 1;
        Ok(VenueFill {
            fill_price: state.fill_price,
            filled_size: size,
            fee: state.fill_price * size.abs() * state.fee_rate,
        })
    }

    async fn funding_rate(&self, venue: &VenueId) -> Result<Decimal> {
        let state = self.state.read();
        Ok(state
            .funding_rates
            .get(venue.as_str())
            .copied()
            .unwrap_or(state.default_funding_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fills_at_configured_price_with_fee() {
        let venue = PaperPerpVenue::new(dec!(40000));
        venue.set_fee_rate(dec!(0.001));
        let fill = venue
            .open_short(&VenueId::new("paper"), dec!(2), 5, 100)
            .await
            .unwrap();
        assert_eq!(fill.fill_price, dec!(40000));
        assert_eq!(fill.fee, dec!(80));
        assert_eq!(venue.open_calls(), 1);
    }

    #[tokio::test]
    async fn per_venue_funding_rate_overrides_default() {
        let venue = PaperPerpVenue::default();
        let drift = VenueId::new("drift");
        venue.set_funding_rate(&drift, dec!(0.0005));
        assert_eq!(venue.funding_rate(&drift).await.unwrap(), dec!(0.0005));
        assert_eq!(
            venue.funding_rate(&VenueId::new("other")).await.unwrap(),
            dec!(0.0001)
        );
    }

    #[tokio::test]
    async fn fail_open_errors_without_counting() {
        let venue = PaperPerpVenue::default();
        venue.set_fail_open(true);
        assert!(venue
            .open_short(&VenueId::new("paper"), dec!(1), 2, 100)
            .await
            .is_err());
        assert_eq!(venue.open_calls(), 0);
    }
}
