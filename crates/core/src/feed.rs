//! Mark price gating.
//!
//! Any operation that trades or revalues on a mark goes through
//! [`fresh_mark`] so stale and low-confidence samples are rejected in one
//! place with one error shape.

use crate::config::FeedConfig;
use crate::error::{EngineError, Result};
use crate::traits::PriceFeed;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Reads the current mark and applies the age and confidence gates.
///
/// # Errors
///
/// `VenueCall` if the feed itself fails, `StalePrice` past
/// `max_price_age_secs`, `LowConfidence` below `min_confidence_bps`.
pub async fn fresh_mark(
    feed: &dyn PriceFeed,
    config: &FeedConfig,
    operation: &'static str,
    now: DateTime<Utc>,
) -> Result<Decimal> {
    let sample = feed
        .get_price(&config.asset)
        .await
        .map_err(|e| EngineError::venue_call(operation, e))?;

    let age_secs = sample.age_secs(now);
    if age_secs > config.max_price_age_secs {
        return Err(EngineError::StalePrice {
            age_secs,
            max_age_secs: config.max_price_age_secs,
        });
    }
    if sample.confidence_bps < config.min_confidence_bps {
        return Err(EngineError::LowConfidence {
            confidence_bps: sample.confidence_bps,
            min_bps: config.min_confidence_bps,
        });
    }

    Ok(sample.price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PriceSample;
    use async_trait::async_trait;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    struct FixedFeed {
        sample: PriceSample,
    }

    #[async_trait]
    impl PriceFeed for FixedFeed {
        async fn get_price(&self, _asset: &str) -> anyhow::Result<PriceSample> {
            Ok(self.sample)
        }
    }

    fn make_config() -> FeedConfig {
        FeedConfig::default()
    }

    #[tokio::test]
    async fn fresh_sample_passes() {
        let now = Utc::now();
        let feed = FixedFeed {
            sample: PriceSample {
                price: dec!(50000),
                timestamp: now - Duration::seconds(5),
                confidence_bps: 9900,
            },
        };
        let mark = fresh_mark(&feed, &make_config(), "open_short", now)
            .await
            .unwrap();
        assert_eq!(mark, dec!(50000));
    }

    #[tokio::test]
    async fn stale_sample_is_rejected() {
        let now = Utc::now();
        let feed = FixedFeed {
            sample: PriceSample {
                price: dec!(50000),
                timestamp: now - Duration::seconds(7200),
                confidence_bps: 9900,
            },
        };
        let err = fresh_mark(&feed, &make_config(), "open_short", now)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StalePrice { .. }));
        assert!(err.is_collaborator_failure());
    }

    #[tokio::test]
    async fn low_confidence_sample_is_rejected() {
        let now = Utc::now();
        let feed = FixedFeed {
            sample: PriceSample {
                price: dec!(50000),
                timestamp: now,
                confidence_bps: 8000,
            },
        };
        let err = fresh_mark(&feed, &make_config(), "refresh_greeks", now)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::LowConfidence { .. }));
    }
}
