use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hedge_core::traits::OptionsVenue;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

#[derive(Debug)]
struct OptionsVenueState {
    iv_bps: u32,
    premium_per_contract: Decimal,
    buyback_per_contract: Decimal,
    sell_calls: u32,
    buyback_calls: u32,
    fail_sell: bool,
    fail_buyback: bool,
}

/// Simulated options venue. Premium and buyback cost are flat per-contract
/// amounts so tests can assert exact PnL.
#[derive(Debug, Clone)]
pub struct PaperOptionsVenue {
    state: Arc<RwLock<OptionsVenueState>>,
}

impl PaperOptionsVenue {
    #[must_use]
    pub fn new(iv_bps: u32) -> Self {
        Self {
            state: Arc::new(RwLock::new(OptionsVenueState {
                iv_bps,
                premium_per_contract: dec!(120),
                buyback_per_contract: dec!(40),
                sell_calls: 0,
                buyback_calls: 0,
                fail_sell: false,
                fail_buyback: false,
            })),
        }
    }

    pub fn set_iv_bps(&self, iv_bps: u32) {
        self.state.write().iv_bps = iv_bps;
    }

    pub fn set_premium_per_contract(&self, premium: Decimal) {
        self.state.write().premium_per_contract = premium;
    }

    pub fn set_buyback_per_contract(&self, cost: Decimal) {
        self.state.write().buyback_per_contract = cost;
    }

    pub fn set_fail_sell(&self, fail: bool) {
        self.state.write().fail_sell = fail;
    }

    pub fn set_fail_buyback(&self, fail: bool) {
        self.state.write().fail_buyback = fail;
    }

    #[must_use]
    pub fn sell_calls(&self) -> u32 {
        self.state.read().sell_calls
    }

    #[must_use]
    pub fn buyback_calls(&self) -> u32 {
        self.state.read().buyback_calls
    }
}

impl Default for PaperOptionsVenue {
    fn default() -> Self {
        Self::new(7000)
    }
}

#[async_trait]
impl OptionsVenue for PaperOptionsVenue {
    async fn sell_put(
        &self,
        _strike: Decimal,
        _expiry: DateTime<Utc>,
        quantity: Decimal,
    ) -> Result<Decimal> {
        let mut state = self.state.write();
        if state.fail_sell {
            bail!("paper venue configured to fail put sales");
        }
        state.sell_calls += 1;
        Ok(state.premium_per_contract * quantity)
    }

    async fn buy_back(&self, _option_ref: u64, quantity: Decimal) -> Result<Decimal> {
        let mut state = self.state.write();
        if state.fail_buyback {
            bail!("paper venue configured to fail buybacks");
        }
        state.buyback_calls += 1;
        Ok(state.buyback_per_contract * quantity)
    }

    async fn implied_volatility(&self) -> Result<u32> {
        Ok(self.state.read().iv_bps)
    }
}
