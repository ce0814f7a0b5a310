use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use crate::rates::{Currency, PairId};

const DEFAULT_REFERENCE_ASSET: &str = "BTC";
const DEFAULT_FEE_PERCENTAGE: f64 = 1.0;
const DEFAULT_FEE_PER_VBYTE: u64 = 2;
const DEFAULT_RATE_REFRESH_INTERVAL_SECS: u64 = 60;
const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyConfig {
    pub symbol: String,
    pub network: String,
    pub min_swap_amount: u64,
    pub max_swap_amount: u64,
    #[serde(default)]
    pub max_zero_conf_amount: Option<u64>,
    /// Static fee-rate estimate in sat/vbyte used for miner fee estimation.
    #[serde(default = "default_fee_per_vbyte")]
    pub fee_per_vbyte: u64,
}

impl CurrencyConfig {
    pub fn currency(&self) -> Currency {
        Currency {
            symbol: self.symbol.clone(),
            network: self.network.clone(),
            min_swap_amount: self.min_swap_amount,
            max_swap_amount: self.max_swap_amount,
            max_zero_conf_amount: self.max_zero_conf_amount,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairConfig {
    pub base: String,
    pub quote: String,
    /// Percent, e.g. `1.0` for a 1% fee.
    #[serde(default = "default_fee_percentage")]
    pub fee_percentage: f64,
}

impl PairConfig {
    pub fn id(&self) -> PairId {
        PairId::new(&self.base, &self.quote)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_reference_asset")]
    pub reference_asset: String,
    pub currencies: Vec<CurrencyConfig>,
    pub pairs: Vec<PairConfig>,
    /// Price of one unit of each asset in the reference asset.
    #[serde(default)]
    pub prices: BTreeMap<String, f64>,
    #[serde(default = "default_rate_refresh_interval_secs")]
    pub rate_refresh_interval_secs: u64,
    #[serde(default = "default_refresh_timeout_secs")]
    pub refresh_timeout_secs: u64,
}

impl ExchangeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("load config {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(raw).context("parse config json")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects configurations the exchange must not start with. Pairs that
    /// reference unknown currencies are left to the rate engine, which fails
    /// its initialization on them.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for c in &self.currencies {
            anyhow::ensure!(
                !c.symbol.trim().is_empty(),
                "currency symbol must not be empty"
            );
            anyhow::ensure!(
                seen.insert(c.symbol.as_str()),
                "duplicate currency symbol: {}",
                c.symbol
            );
            anyhow::ensure!(
                c.min_swap_amount <= c.max_swap_amount,
                "currency {}: min_swap_amount {} exceeds max_swap_amount {}",
                c.symbol,
                c.min_swap_amount,
                c.max_swap_amount
            );
        }

        let mut pairs = HashSet::new();
        for p in &self.pairs {
            anyhow::ensure!(
                p.fee_percentage.is_finite() && p.fee_percentage >= 0.0,
                "pair {}: invalid fee_percentage {}",
                p.id(),
                p.fee_percentage
            );
            anyhow::ensure!(pairs.insert(p.id()), "duplicate pair: {}", p.id());
        }

        anyhow::ensure!(
            self.rate_refresh_interval_secs > 0,
            "rate_refresh_interval_secs must be > 0"
        );
        anyhow::ensure!(
            self.refresh_timeout_secs > 0,
            "refresh_timeout_secs must be > 0"
        );

        Ok(())
    }

    pub fn currencies(&self) -> Vec<Currency> {
        self.currencies.iter().map(CurrencyConfig::currency).collect()
    }

    pub fn pair_ids(&self) -> Vec<PairId> {
        self.pairs.iter().map(PairConfig::id).collect()
    }

    /// Configured percentage fees as fractions, keyed by pair id.
    pub fn percentage_fees(&self) -> BTreeMap<PairId, f64> {
        self.pairs
            .iter()
            .map(|p| (p.id(), p.fee_percentage / 100.0))
            .collect()
    }

    pub fn fee_rates(&self) -> BTreeMap<String, u64> {
        self.currencies
            .iter()
            .map(|c| (c.symbol.clone(), c.fee_per_vbyte))
            .collect()
    }

    pub fn rate_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.rate_refresh_interval_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }
}

fn default_reference_asset() -> String {
    DEFAULT_REFERENCE_ASSET.to_string()
}

fn default_fee_percentage() -> f64 {
    DEFAULT_FEE_PERCENTAGE
}

fn default_fee_per_vbyte() -> u64 {
    DEFAULT_FEE_PER_VBYTE
}

fn default_rate_refresh_interval_secs() -> u64 {
    DEFAULT_RATE_REFRESH_INTERVAL_SECS
}

fn default_refresh_timeout_secs() -> u64 {
    DEFAULT_REFRESH_TIMEOUT_SECS
}
