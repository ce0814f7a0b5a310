use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PriceError {
    #[error("price unavailable for {asset}: {reason}")]
    PriceUnavailable { asset: String, reason: String },
}

impl PriceError {
    pub fn unavailable(asset: &str, reason: impl Into<String>) -> Self {
        Self::PriceUnavailable {
            asset: asset.to_string(),
            reason: reason.into(),
        }
    }
}

/// Supplies the price of one unit of an asset in the reference asset.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn get_price(&self, asset: &str) -> Result<f64, PriceError>;
}

/// Price table kept in memory, seeded from configuration.
#[derive(Debug, Default)]
pub struct StaticPriceSource {
    prices: RwLock<BTreeMap<String, f64>>,
}

impl StaticPriceSource {
    pub fn new(prices: BTreeMap<String, f64>) -> Self {
        Self {
            prices: RwLock::new(prices),
        }
    }

    pub fn set_price(&self, asset: &str, price: f64) {
        self.prices
            .write()
            .expect("price table lock poisoned")
            .insert(asset.to_string(), price);
    }

    pub fn remove_price(&self, asset: &str) {
        self.prices
            .write()
            .expect("price table lock poisoned")
            .remove(asset);
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    async fn get_price(&self, asset: &str) -> Result<f64, PriceError> {
        let price = self
            .prices
            .read()
            .expect("price table lock poisoned")
            .get(asset)
            .copied()
            .ok_or_else(|| PriceError::unavailable(asset, "no price configured"))?;

        if !price.is_finite() || price <= 0.0 {
            return Err(PriceError::unavailable(
                asset,
                format!("invalid price {price}"),
            ));
        }
        Ok(price)
    }
}
