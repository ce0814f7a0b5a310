use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::fees::{FeeError, FeeSource};
use super::price::{PriceError, PriceSource};
use super::{
    AssetPair, Currency, Fees, Limits, MinerFees, PairId, PairInfo, RateError, ZeroConfLimits,
};

const DEFAULT_REFERENCE_ASSET: &str = "BTC";
const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one refresh cycle, per pair.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    /// Pairs that got a new `PairInfo`.
    pub updated: Vec<PairId>,
    /// Pairs that kept their previous `PairInfo` (if any).
    pub failed: Vec<PairId>,
    /// Pairs withdrawn because their limits do not overlap.
    pub not_tradable: Vec<PairId>,
}

/// Computes rates, fees, limits and hashes for the configured pairs.
///
/// Every `PairInfo` is published as a whole behind an `Arc`; readers never
/// see a partially refreshed pair.
pub struct RateEngine {
    reference_asset: String,
    refresh_timeout: Duration,
    prices: Arc<dyn PriceSource>,
    fees: Arc<dyn FeeSource>,
    currencies: RwLock<HashMap<String, Currency>>,
    pairs: Vec<PairId>,
    infos: RwLock<HashMap<PairId, Arc<PairInfo>>>,
    /// Held for a whole refresh cycle so cycles publish in the order they start.
    refresh_lock: Mutex<()>,
}

impl RateEngine {
    pub fn new(
        currencies: impl IntoIterator<Item = Currency>,
        prices: Arc<dyn PriceSource>,
        fees: Arc<dyn FeeSource>,
    ) -> Self {
        Self {
            reference_asset: DEFAULT_REFERENCE_ASSET.to_string(),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            prices,
            fees,
            currencies: RwLock::new(
                currencies
                    .into_iter()
                    .map(|c| (c.symbol.clone(), c))
                    .collect(),
            ),
            pairs: Vec::new(),
            infos: RwLock::new(HashMap::new()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Asset whose price is 1 by definition; it is never looked up.
    pub fn with_reference_asset(mut self, asset: impl Into<String>) -> Self {
        self.reference_asset = asset.into();
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Registers the pairs and runs the first refresh. Fails if a pair
    /// references a currency that is not configured; a failing first refresh
    /// only leaves the affected pairs without data.
    pub async fn initialize(
        &mut self,
        pairs: impl IntoIterator<Item = PairId>,
    ) -> Result<RefreshReport, RateError> {
        let configured = {
            let currencies = self.currencies.get_mut().expect("currency lock poisoned");
            let mut configured: Vec<PairId> = Vec::new();
            for pair in pairs {
                for symbol in [pair.base(), pair.quote()] {
                    if !currencies.contains_key(symbol) {
                        return Err(RateError::UnknownCurrency {
                            pair: pair.clone(),
                            symbol: symbol.to_string(),
                        });
                    }
                }
                if !configured.contains(&pair) {
                    configured.push(pair);
                }
            }
            configured
        };
        self.pairs = configured;

        let report = match self.refresh().await {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!(error = %err, "initial rate refresh failed");
                RefreshReport {
                    failed: self.pairs.clone(),
                    ..RefreshReport::default()
                }
            }
        };

        tracing::info!(
            pairs = self.pairs.len(),
            tradable = report.updated.len(),
            "rate engine initialized"
        );
        Ok(report)
    }

    /// Pulls fees and prices and recomputes every pair. A fee source failure
    /// aborts the cycle; a price failure only affects pairs needing that
    /// price. Pairs that fail keep their last published `PairInfo`.
    ///
    /// Concurrent calls run one after another.
    pub async fn refresh(&self) -> Result<RefreshReport, FeeError> {
        let _cycle = self.refresh_lock.lock().await;

        match tokio::time::timeout(self.refresh_timeout, self.fees.refresh()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "fee refresh failed");
                return Err(err);
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.refresh_timeout, "fee refresh timed out");
                return Err(FeeError::Timeout);
            }
        }

        let miner_fees = self.fees.miner_fees();
        let percentage_fees = self.fees.percentage_fees();
        let prices = self.fetch_prices().await;
        let currencies = self
            .currencies
            .read()
            .expect("currency lock poisoned")
            .clone();

        let mut report = RefreshReport::default();
        let mut next = Vec::with_capacity(self.pairs.len());
        for pair in &self.pairs {
            match self.compute_pair(pair, &currencies, &prices, &miner_fees, &percentage_fees) {
                Ok(info) => {
                    next.push((pair.clone(), Some(Arc::new(info))));
                    report.updated.push(pair.clone());
                }
                Err(err @ RateError::InvalidLimits { .. }) => {
                    tracing::warn!(pair_id = %pair, error = %err, "pair not tradable");
                    next.push((pair.clone(), None));
                    report.not_tradable.push(pair.clone());
                }
                Err(err) => {
                    tracing::warn!(
                        pair_id = %pair,
                        error = %err,
                        "pair refresh failed, keeping last known data"
                    );
                    report.failed.push(pair.clone());
                }
            }
        }

        let mut infos = self.infos.write().expect("pair info lock poisoned");
        for (pair, info) in next {
            match info {
                Some(info) => {
                    infos.insert(pair, info);
                }
                None => {
                    infos.remove(&pair);
                }
            }
        }

        Ok(report)
    }

    pub fn spawn_refresh_loop(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;

                match self.refresh().await {
                    Ok(report) if report.failed.is_empty() && report.not_tradable.is_empty() => {
                        tracing::debug!(updated = report.updated.len(), "rates refreshed");
                    }
                    Ok(report) => {
                        tracing::warn!(
                            updated = report.updated.len(),
                            failed = %join_ids(&report.failed),
                            not_tradable = %join_ids(&report.not_tradable),
                            "rates partially refreshed"
                        );
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "rate refresh cycle skipped");
                    }
                }
            }
        })
    }

    pub fn pairs(&self) -> &[PairId] {
        &self.pairs
    }

    pub fn get_pair_info(&self, pair: &PairId) -> Result<Arc<PairInfo>, RateError> {
        if !self.pairs.contains(pair) {
            return Err(RateError::UnknownPair(pair.clone()));
        }
        self.infos
            .read()
            .expect("pair info lock poisoned")
            .get(pair)
            .cloned()
            .ok_or_else(|| RateError::PairNotTradable(pair.clone()))
    }

    /// Every pair that currently has data, ordered by pair id.
    pub fn get_pairs(&self) -> Vec<Arc<PairInfo>> {
        let infos = self.infos.read().expect("pair info lock poisoned");
        let mut out: Vec<_> = infos.values().cloned().collect();
        out.sort_by(|a, b| a.id().cmp(b.id()));
        out
    }

    /// Checks a client-supplied hash against the current data of a pair.
    pub fn verify_pair_hash(&self, pair: &PairId, hash: &str) -> Result<Arc<PairInfo>, RateError> {
        let info = self.get_pair_info(pair)?;
        if info.hash() != hash {
            return Err(RateError::StaleHash(pair.clone()));
        }
        Ok(info)
    }

    pub fn accept_zero_conf(&self, symbol: &str, amount: u64) -> bool {
        self.currencies
            .read()
            .expect("currency lock poisoned")
            .get(symbol)
            .is_some_and(|c| c.accepts_zero_conf(amount))
    }

    pub fn currency(&self, symbol: &str) -> Option<Currency> {
        self.currencies
            .read()
            .expect("currency lock poisoned")
            .get(symbol)
            .cloned()
    }

    /// Replaces the limits of a known currency. Takes effect on the next
    /// refresh.
    pub fn update_currency(&self, currency: Currency) -> Result<(), RateError> {
        let mut currencies = self.currencies.write().expect("currency lock poisoned");
        match currencies.get_mut(&currency.symbol) {
            Some(slot) => {
                *slot = currency;
                Ok(())
            }
            None => Err(RateError::UnknownCurrencySymbol(currency.symbol)),
        }
    }

    async fn fetch_prices(&self) -> HashMap<String, Result<f64, PriceError>> {
        let assets: BTreeSet<&str> = self
            .pairs
            .iter()
            .filter(|p| !p.is_pegged())
            .flat_map(|p| [p.base(), p.quote()])
            .filter(|asset| *asset != self.reference_asset)
            .collect();

        let lookups = assets.into_iter().map(|asset| async move {
            let price =
                match tokio::time::timeout(self.refresh_timeout, self.prices.get_price(asset)).await
                {
                    Ok(Ok(price)) if price.is_finite() && price > 0.0 => Ok(price),
                    Ok(Ok(price)) => Err(PriceError::unavailable(
                        asset,
                        format!("invalid price {price}"),
                    )),
                    Ok(Err(err)) => Err(err),
                    Err(_) => Err(PriceError::unavailable(asset, "timed out")),
                };
            (asset.to_string(), price)
        });

        join_all(lookups).await.into_iter().collect()
    }

    fn price_of(
        &self,
        asset: &str,
        prices: &HashMap<String, Result<f64, PriceError>>,
    ) -> Result<f64, PriceError> {
        if asset == self.reference_asset {
            return Ok(1.0);
        }
        match prices.get(asset) {
            Some(Ok(price)) => Ok(*price),
            Some(Err(err)) => Err(err.clone()),
            None => Err(PriceError::unavailable(asset, "not fetched")),
        }
    }

    fn compute_pair(
        &self,
        pair: &PairId,
        currencies: &HashMap<String, Currency>,
        prices: &HashMap<String, Result<f64, PriceError>>,
        miner_fees: &HashMap<String, MinerFees>,
        percentage_fees: &HashMap<PairId, f64>,
    ) -> Result<PairInfo, RateError> {
        let base = lookup_currency(currencies, pair, pair.base())?;
        let quote = lookup_currency(currencies, pair, pair.quote())?;

        let rate = if pair.is_pegged() {
            1.0
        } else {
            self.price_of(pair.base(), prices)? / self.price_of(pair.quote(), prices)?
        };

        let fraction =
            percentage_fees
                .get(pair)
                .copied()
                .ok_or_else(|| RateError::FeesUnavailable {
                    pair: pair.clone(),
                    reason: "no percentage fee".to_string(),
                })?;
        let fees = Fees {
            percentage: fraction * 100.0,
            miner_fees: AssetPair {
                base_asset: lookup_miner_fees(miner_fees, pair, pair.base())?,
                quote_asset: lookup_miner_fees(miner_fees, pair, pair.quote())?,
            },
        };

        let limits = compute_limits(pair, base, quote, rate)?;

        PairInfo::new(pair.clone(), rate, fees, limits)
    }
}

/// Limits in quote units: base limits are converted with `rate`, then the
/// stricter of the two currencies wins on each side.
fn compute_limits(
    pair: &PairId,
    base: &Currency,
    quote: &Currency,
    rate: f64,
) -> Result<Limits, RateError> {
    let minimal = quote
        .min_swap_amount
        .max((base.min_swap_amount as f64 * rate).ceil() as u64);
    let maximal = quote
        .max_swap_amount
        .min((base.max_swap_amount as f64 * rate).floor() as u64);

    if minimal > maximal {
        return Err(RateError::InvalidLimits {
            pair: pair.clone(),
            minimal,
            maximal,
        });
    }

    Ok(Limits {
        minimal,
        maximal,
        maximal_zero_conf: ZeroConfLimits {
            base_asset: base.max_zero_conf_amount,
            quote_asset: quote.max_zero_conf_amount,
        },
    })
}

fn lookup_currency<'a>(
    currencies: &'a HashMap<String, Currency>,
    pair: &PairId,
    symbol: &str,
) -> Result<&'a Currency, RateError> {
    currencies
        .get(symbol)
        .ok_or_else(|| RateError::UnknownCurrency {
            pair: pair.clone(),
            symbol: symbol.to_string(),
        })
}

fn lookup_miner_fees(
    miner_fees: &HashMap<String, MinerFees>,
    pair: &PairId,
    symbol: &str,
) -> Result<MinerFees, RateError> {
    miner_fees
        .get(symbol)
        .copied()
        .ok_or_else(|| RateError::FeesUnavailable {
            pair: pair.clone(),
            reason: format!("no miner fees for {symbol}"),
        })
}

fn join_ids(pairs: &[PairId]) -> String {
    pairs
        .iter()
        .map(PairId::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
