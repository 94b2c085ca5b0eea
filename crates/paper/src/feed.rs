use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hedge_core::traits::PriceFeed;
use hedge_core::types::PriceSample;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

#[derive(Debug)]
struct FeedState {
    price: Decimal,
    confidence_bps: u32,
    /// When set, samples carry this timestamp instead of the read time.
    fixed_timestamp: Option<DateTime<Utc>>,
    fail: bool,
}

/// Deterministic price feed for paper runs and tests.
///
/// All knobs are settable after construction; reads never block on anything
/// external. Zero network calls.
#[derive(Debug, Clone)]
pub struct PaperPriceFeed {
    state: Arc<RwLock<FeedState>>,
}

impl PaperPriceFeed {
    #[must_use]
    pub fn new(price: Decimal) -> Self {
        Self {
            state: Arc::new(RwLock::new(FeedState {
                price,
                confidence_bps: 10_000,
                fixed_timestamp: None,
                fail: false,
            })),
        }
    }

    pub fn set_price(&self, price: Decimal) {
        self.state.write().price = price;
    }

    #[must_use]
    pub fn price(&self) -> Decimal {
        self.state.read().price
    }

    pub fn set_confidence_bps(&self, confidence_bps: u32) {
        self.state.write().confidence_bps = confidence_bps;
    }

    /// Pins sample timestamps, e.g. in the past to simulate a stalled feed.
    pub fn set_timestamp(&self, timestamp: DateTime<Utc>) {
        self.state.write().fixed_timestamp = Some(timestamp);
    }

    pub fn clear_timestamp(&self) {
        self.state.write().fixed_timestamp = None;
    }

    pub fn set_fail(&self, fail: bool) {
        self.state.write().fail = fail;
    }
}

impl Default for PaperPriceFeed {
    fn default() -> Self {
        Self::new(dec!(50000))
    }
}

#[async_trait]
impl PriceFeed for PaperPriceFeed {
    async fn get_price(&self, _asset: &str) -> Result<PriceSample> {
        let state = self.state.read();
        if state.fail {
            bail!("paper feed configured to fail");
        }
        Ok(PriceSample {
            price: state.price,
            timestamp: state.fixed_timestamp.unwrap_or_else(Utc::now),
            confidence_bps: state.confidence_bps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_configured_price() {
        let feed = PaperPriceFeed::new(dec!(42000));
        let sample = feed.get_price("BTC").await.unwrap();
        assert_eq!(sample.price, dec!(42000));
        assert_eq!(sample.confidence_bps, 10_000);
    }

    #[tokio::test]
    async fn fail_flag_errors_the_read() {
        let feed = PaperPriceFeed::default();
        feed.set_fail(true);
        assert!(feed.get_price("BTC").await.is_err());
    }

    #[tokio::test]
    async fn fixed_timestamp_is_carried_on_samples() {
        let feed = PaperPriceFeed::default();
        let pinned = Utc::now() - chrono::Duration::hours(3);
        feed.set_timestamp(pinned);
        let sample = feed.get_price("BTC").await.unwrap();
        assert_eq!(sample.timestamp, pinned);
    }
}
