pub mod engine;
pub mod fees;
pub mod hash;
pub mod price;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a trading pair, rendered as `BASE/QUOTE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairId {
    base: String,
    quote: String,
}

impl PairId {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Same-asset pairs carry fees and limits only; their rate is always 1.
    pub fn is_pegged(&self) -> bool {
        self.base == self.quote
    }
}

impl fmt::Display for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for PairId {
    type Err = RateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .split_once('/')
            .ok_or_else(|| RateError::InvalidPairId(s.to_string()))?;
        if base.is_empty() || quote.is_empty() || quote.contains('/') {
            return Err(RateError::InvalidPairId(s.to_string()));
        }
        Ok(Self::new(base, quote))
    }
}

impl Serialize for PairId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PairId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Static per-currency limits. Amounts are in the currency's atomic unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub symbol: String,
    pub network: String,
    pub min_swap_amount: u64,
    pub max_swap_amount: u64,
    pub max_zero_conf_amount: Option<u64>,
}

impl Currency {
    pub fn accepts_zero_conf(&self, amount: u64) -> bool {
        self.max_zero_conf_amount
            .is_some_and(|max_zero_conf| amount <= max_zero_conf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseMinerFees {
    pub lockup: u64,
    pub claim: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerFees {
    pub normal: u64,
    pub reverse: ReverseMinerFees,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPair<T> {
    pub base_asset: T,
    pub quote_asset: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fees {
    /// Percent, i.e. the configured fraction times 100.
    pub percentage: f64,
    pub miner_fees: AssetPair<MinerFees>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZeroConfLimits {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_asset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_asset: Option<u64>,
}

/// Quote-denominated swap limits of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Limits {
    pub minimal: u64,
    pub maximal: u64,
    pub maximal_zero_conf: ZeroConfLimits,
}

/// Computed state of a pair. Built in one piece and never mutated, so the
/// hash always matches rate, fees and limits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairInfo {
    id: PairId,
    rate: f64,
    fees: Fees,
    limits: Limits,
    hash: String,
}

impl PairInfo {
    pub fn new(id: PairId, rate: f64, fees: Fees, limits: Limits) -> Result<Self, RateError> {
        let hash = hash::pair_hash(rate, &fees, &limits)?;
        Ok(Self {
            id,
            rate,
            fees,
            limits,
            hash,
        })
    }

    pub fn id(&self) -> &PairId {
        &self.id
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn fees(&self) -> &Fees {
        &self.fees
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateError {
    #[error("invalid pair id: {0}")]
    InvalidPairId(String),

    #[error("unknown pair: {0}")]
    UnknownPair(PairId),

    #[error("pair {0} is currently not tradable")]
    PairNotTradable(PairId),

    #[error("pair {pair} references unknown currency {symbol}")]
    UnknownCurrency { pair: PairId, symbol: String },

    #[error("unknown currency: {0}")]
    UnknownCurrencySymbol(String),

    #[error("pair hash of {0} is outdated")]
    StaleHash(PairId),

    #[error("fees for pair {pair} unavailable: {reason}")]
    FeesUnavailable { pair: PairId, reason: String },

    #[error("pair {pair} has minimal limit {minimal} above maximal limit {maximal}")]
    InvalidLimits {
        pair: PairId,
        minimal: u64,
        maximal: u64,
    },

    #[error(transparent)]
    Price(#[from] price::PriceError),

    #[error("serialize pair data: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_id_round_trips_through_display() {
        let id: PairId = "LTC/BTC".parse().unwrap();
        assert_eq!(id.base(), "LTC");
        assert_eq!(id.quote(), "BTC");
        assert_eq!(id.to_string(), "LTC/BTC");
        assert!(!id.is_pegged());
        assert!(PairId::new("BTC", "BTC").is_pegged());
    }

    #[test]
    fn pair_id_rejects_malformed() {
        for raw in ["", "BTC", "/BTC", "BTC/", "A/B/C"] {
            assert!(
                matches!(raw.parse::<PairId>(), Err(RateError::InvalidPairId(_))),
                "{raw}"
            );
        }
    }

    #[test]
    fn zero_conf_boundary_is_inclusive() {
        let btc = Currency {
            symbol: "BTC".to_string(),
            network: "bitcoinRegtest".to_string(),
            min_swap_amount: 1,
            max_swap_amount: 100,
            max_zero_conf_amount: Some(10_000_000),
        };
        assert!(btc.accepts_zero_conf(10_000_000));
        assert!(btc.accepts_zero_conf(0));
        assert!(!btc.accepts_zero_conf(10_000_001));

        let no_zero_conf = Currency {
            max_zero_conf_amount: None,
            ..btc
        };
        assert!(!no_zero_conf.accepts_zero_conf(0));
    }
}
