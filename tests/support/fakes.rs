use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use swap_exchange_core::rates::fees::{FeeError, FeeSource};
use swap_exchange_core::rates::price::{PriceError, PriceSource};
use swap_exchange_core::rates::{Currency, MinerFees, PairId};
use swap_exchange_core::status::lookup::{LookupError, TransactionLookup};
use swap_exchange_core::swap::{
    ChannelCreationRecord, OrderSide, ReverseSwapRecord, SwapRecord, SwapStateStore,
};
use swap_exchange_core::status::SwapUpdateEvent;

pub fn currency(symbol: &str, min: u64, max: u64, max_zero_conf: Option<u64>) -> Currency {
    Currency {
        symbol: symbol.to_string(),
        network: format!("{}Regtest", symbol.to_lowercase()),
        min_swap_amount: min,
        max_swap_amount: max,
        max_zero_conf_amount: max_zero_conf,
    }
}

/// Price table that records which assets were asked for. Assets marked as
/// stalled never answer. A delayed call answers with the price it read when
/// it started.
#[derive(Default)]
pub struct RecordingPriceSource {
    prices: Mutex<HashMap<String, f64>>,
    stalled: Mutex<HashSet<String>>,
    delay_next: Mutex<Option<Duration>>,
    requested: Mutex<Vec<String>>,
}

impl RecordingPriceSource {
    pub fn new(prices: &[(&str, f64)]) -> Arc<Self> {
        let source = Self::default();
        for (asset, price) in prices {
            source.set_price(asset, *price);
        }
        Arc::new(source)
    }

    pub fn set_price(&self, asset: &str, price: f64) {
        self.prices
            .lock()
            .unwrap()
            .insert(asset.to_string(), price);
    }

    pub fn remove_price(&self, asset: &str) {
        self.prices.lock().unwrap().remove(asset);
    }

    pub fn stall(&self, asset: &str) {
        self.stalled.lock().unwrap().insert(asset.to_string());
    }

    pub fn delay_next_call(&self, delay: Duration) {
        *self.delay_next.lock().unwrap() = Some(delay);
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl PriceSource for RecordingPriceSource {
    async fn get_price(&self, asset: &str) -> Result<f64, PriceError> {
        self.requested.lock().unwrap().push(asset.to_string());
        if self.stalled.lock().unwrap().contains(asset) {
            std::future::pending::<()>().await;
        }
        let price = self
            .prices
            .lock()
            .unwrap()
            .get(asset)
            .copied()
            .ok_or_else(|| PriceError::unavailable(asset, "no price"));

        let delay = self.delay_next.lock().unwrap().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        price
    }
}

/// Fee source with fixed values that can be switched into a failing state.
pub struct SwitchableFeeSource {
    miner_fees: HashMap<String, MinerFees>,
    percentage_fees: HashMap<PairId, f64>,
    failing: AtomicBool,
    refreshes: AtomicUsize,
}

impl SwitchableFeeSource {
    /// `fee_rates` are sat/vbyte per currency; `percentage_fees` are fractions.
    pub fn new(fee_rates: &[(&str, u64)], percentage_fees: &[(PairId, f64)]) -> Arc<Self> {
        Arc::new(Self {
            miner_fees: fee_rates
                .iter()
                .map(|(symbol, rate)| (symbol.to_string(), MinerFees::from_fee_rate(*rate)))
                .collect(),
            percentage_fees: percentage_fees.iter().cloned().collect(),
            failing: AtomicBool::new(false),
            refreshes: AtomicUsize::new(0),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeeSource for SwitchableFeeSource {
    async fn refresh(&self) -> Result<(), FeeError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(FeeError::Unavailable {
                currency: "*".to_string(),
                reason: "estimator offline".to_string(),
            });
        }
        Ok(())
    }

    fn miner_fees(&self) -> HashMap<String, MinerFees> {
        self.miner_fees.clone()
    }

    fn percentage_fees(&self) -> HashMap<PairId, f64> {
        self.percentage_fees.clone()
    }
}

#[derive(Default)]
pub struct MemorySwapStore {
    pub swaps: Vec<SwapRecord>,
    pub reverse_swaps: Vec<ReverseSwapRecord>,
    pub channel_creations: BTreeMap<String, ChannelCreationRecord>,
}

impl MemorySwapStore {
    pub fn with_swap(mut self, id: &str, status: SwapUpdateEvent) -> Self {
        self.swaps.push(SwapRecord {
            id: id.to_string(),
            pair: PairId::new("LTC", "BTC"),
            order_side: OrderSide::Buy,
            status,
            failure_reason: None,
            transaction_id: None,
        });
        self
    }

    pub fn with_failed_swap(mut self, id: &str, status: SwapUpdateEvent, reason: &str) -> Self {
        self = self.with_swap(id, status);
        if let Some(swap) = self.swaps.last_mut() {
            swap.failure_reason = Some(reason.to_string());
        }
        self
    }

    pub fn with_reverse_swap(
        mut self,
        id: &str,
        order_side: OrderSide,
        status: SwapUpdateEvent,
        transaction_id: Option<&str>,
    ) -> Self {
        self.reverse_swaps.push(ReverseSwapRecord {
            id: id.to_string(),
            pair: PairId::new("LTC", "BTC"),
            order_side,
            status,
            failure_reason: None,
            transaction_id: transaction_id.map(str::to_string),
        });
        self
    }

    pub fn with_channel(mut self, swap_id: &str, funding_txid: &str, vout: u32) -> Self {
        self.channel_creations.insert(
            swap_id.to_string(),
            ChannelCreationRecord {
                swap_id: swap_id.to_string(),
                funding_transaction_id: funding_txid.to_string(),
                funding_transaction_vout: vout,
            },
        );
        self
    }
}

impl SwapStateStore for MemorySwapStore {
    fn swaps(&self) -> Result<Vec<SwapRecord>> {
        Ok(self.swaps.clone())
    }

    fn reverse_swaps(&self) -> Result<Vec<ReverseSwapRecord>> {
        Ok(self.reverse_swaps.clone())
    }

    fn channel_creation(&self, swap_id: &str) -> Result<Option<ChannelCreationRecord>> {
        Ok(self.channel_creations.get(swap_id).cloned())
    }
}

/// Serves raw transactions for the currencies it knows and answers
/// `NotSupportedForCurrency` for every other one.
#[derive(Default)]
pub struct MemoryTransactionLookup {
    transactions: HashMap<String, HashMap<String, String>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MemoryTransactionLookup {
    pub fn with_transaction(mut self, currency: &str, txid: &str, hex: &str) -> Self {
        self.transactions
            .entry(currency.to_string())
            .or_default()
            .insert(txid.to_string(), hex.to_string());
        self
    }

    pub fn supporting(mut self, currency: &str) -> Self {
        self.transactions.entry(currency.to_string()).or_default();
        self
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionLookup for MemoryTransactionLookup {
    async fn get_transaction_hex(
        &self,
        currency: &str,
        transaction_id: &str,
    ) -> Result<String, LookupError> {
        self.calls
            .lock()
            .unwrap()
            .push((currency.to_string(), transaction_id.to_string()));

        let known = self
            .transactions
            .get(currency)
            .ok_or_else(|| LookupError::NotSupportedForCurrency(currency.to_string()))?;
        known
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(transaction_id.to_string()))
    }
}
