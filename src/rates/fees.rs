use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{MinerFees, PairId, ReverseMinerFees};

/// Virtual sizes of the transactions the exchange pays miner fees for.
pub const NORMAL_CLAIM_VBYTES: u64 = 140;
pub const REVERSE_LOCKUP_VBYTES: u64 = 153;
pub const REVERSE_CLAIM_VBYTES: u64 = 138;

impl MinerFees {
    pub fn from_fee_rate(sat_per_vbyte: u64) -> Self {
        Self {
            normal: sat_per_vbyte.saturating_mul(NORMAL_CLAIM_VBYTES),
            reverse: ReverseMinerFees {
                lockup: sat_per_vbyte.saturating_mul(REVERSE_LOCKUP_VBYTES),
                claim: sat_per_vbyte.saturating_mul(REVERSE_CLAIM_VBYTES),
            },
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum FeeError {
    #[error("fee estimate for {currency} unavailable: {reason}")]
    Unavailable { currency: String, reason: String },

    #[error("fee refresh timed out")]
    Timeout,
}

/// Source of the percentage fees and miner fee estimates the rate engine
/// attaches to pairs.
#[async_trait]
pub trait FeeSource: Send + Sync {
    async fn refresh(&self) -> Result<(), FeeError>;

    fn miner_fees(&self) -> HashMap<String, MinerFees>;

    /// Fractions, e.g. `0.01` for 1%.
    fn percentage_fees(&self) -> HashMap<PairId, f64>;
}

/// Estimates the fee rate (sat/vbyte) a currency's chain currently needs.
#[async_trait]
pub trait FeeEstimator: Send + Sync {
    async fn estimate_fee_rate(&self, currency: &str) -> Result<u64, FeeError>;
}

#[derive(Debug, Default)]
pub struct StaticFeeEstimator {
    rates: RwLock<BTreeMap<String, u64>>,
}

impl StaticFeeEstimator {
    pub fn new(rates: BTreeMap<String, u64>) -> Self {
        Self {
            rates: RwLock::new(rates),
        }
    }

    pub fn set_fee_rate(&self, currency: &str, sat_per_vbyte: u64) {
        self.rates
            .write()
            .expect("fee rate lock poisoned")
            .insert(currency.to_string(), sat_per_vbyte);
    }
}

#[async_trait]
impl FeeEstimator for StaticFeeEstimator {
    async fn estimate_fee_rate(&self, currency: &str) -> Result<u64, FeeError> {
        self.rates
            .read()
            .expect("fee rate lock poisoned")
            .get(currency)
            .copied()
            .ok_or_else(|| FeeError::Unavailable {
                currency: currency.to_string(),
                reason: "no fee rate configured".to_string(),
            })
    }
}

/// Derives miner fees from per-currency fee-rate estimates and serves the
/// configured percentage fees.
pub struct EstimatingFeeSource {
    estimator: Arc<dyn FeeEstimator>,
    currencies: Vec<String>,
    percentage_fees: HashMap<PairId, f64>,
    miner_fees: RwLock<HashMap<String, MinerFees>>,
}

impl EstimatingFeeSource {
    pub fn new(
        estimator: Arc<dyn FeeEstimator>,
        currencies: Vec<String>,
        percentage_fees: impl IntoIterator<Item = (PairId, f64)>,
    ) -> Self {
        Self {
            estimator,
            currencies,
            percentage_fees: percentage_fees.into_iter().collect(),
            miner_fees: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl FeeSource for EstimatingFeeSource {
    async fn refresh(&self) -> Result<(), FeeError> {
        let mut next = HashMap::with_capacity(self.currencies.len());
        for currency in &self.currencies {
            let rate = self.estimator.estimate_fee_rate(currency).await?;
            next.insert(currency.clone(), MinerFees::from_fee_rate(rate));
        }

        *self.miner_fees.write().expect("miner fee lock poisoned") = next;
        Ok(())
    }

    fn miner_fees(&self) -> HashMap<String, MinerFees> {
        self.miner_fees
            .read()
            .expect("miner fee lock poisoned")
            .clone()
    }

    fn percentage_fees(&self) -> HashMap<PairId, f64> {
        self.percentage_fees.clone()
    }
}
