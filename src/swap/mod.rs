pub mod store;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::rates::PairId;
use crate::status::SwapUpdateEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderSide {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "buy" => Ok(OrderSide::Buy),
            "sell" => Ok(OrderSide::Sell),
            other => anyhow::bail!("unknown order side: {other}"),
        }
    }
}

/// Currency whose chain carries the on-chain leg of a swap.
///
/// Normal swaps lock on the chain of the currency the user sends; reverse
/// swaps lock on the chain of the currency the user receives.
pub fn chain_currency(pair: &PairId, side: OrderSide, is_reverse: bool) -> &str {
    match (is_reverse, side) {
        (false, OrderSide::Buy) | (true, OrderSide::Sell) => pair.quote(),
        (false, OrderSide::Sell) | (true, OrderSide::Buy) => pair.base(),
    }
}

/// Persisted submarine swap: the client pays on-chain, the exchange pays
/// off-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRecord {
    pub id: String,
    pub pair: PairId,
    pub order_side: OrderSide,
    pub status: SwapUpdateEvent,
    pub failure_reason: Option<String>,
    pub transaction_id: Option<String>,
}

impl SwapRecord {
    pub fn chain_currency(&self) -> &str {
        chain_currency(&self.pair, self.order_side, false)
    }
}

/// Persisted reverse swap: the client pays off-chain, the exchange locks
/// on-chain for the client to claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseSwapRecord {
    pub id: String,
    pub pair: PairId,
    pub order_side: OrderSide,
    pub status: SwapUpdateEvent,
    pub failure_reason: Option<String>,
    /// Lockup transaction sent by the exchange.
    pub transaction_id: Option<String>,
}

impl ReverseSwapRecord {
    pub fn chain_currency(&self) -> &str {
        chain_currency(&self.pair, self.order_side, true)
    }
}

/// Channel opened to the client as part of a swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCreationRecord {
    pub swap_id: String,
    pub funding_transaction_id: String,
    pub funding_transaction_vout: u32,
}

/// Read access to persisted swap state, used once at startup.
pub trait SwapStateStore: Send + Sync {
    fn swaps(&self) -> Result<Vec<SwapRecord>>;

    fn reverse_swaps(&self) -> Result<Vec<ReverseSwapRecord>>;

    fn channel_creation(&self, swap_id: &str) -> Result<Option<ChannelCreationRecord>>;
}
