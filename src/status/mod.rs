pub mod distributor;
pub mod lookup;
pub mod reconciler;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a swap as published to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapUpdateEvent {
    #[serde(rename = "swap.created")]
    SwapCreated,
    #[serde(rename = "swap.expired")]
    SwapExpired,

    #[serde(rename = "invoice.set")]
    InvoiceSet,
    #[serde(rename = "invoice.pending")]
    InvoicePending,
    #[serde(rename = "invoice.paid")]
    InvoicePaid,
    #[serde(rename = "invoice.failedToPay")]
    InvoiceFailedToPay,
    #[serde(rename = "invoice.settled")]
    InvoiceSettled,
    #[serde(rename = "invoice.expired")]
    InvoiceExpired,

    #[serde(rename = "transaction.mempool")]
    TransactionMempool,
    #[serde(rename = "transaction.confirmed")]
    TransactionConfirmed,
    #[serde(rename = "transaction.claimed")]
    TransactionClaimed,
    #[serde(rename = "transaction.refunded")]
    TransactionRefunded,
    #[serde(rename = "transaction.failed")]
    TransactionFailed,
    #[serde(rename = "transaction.lockupFailed")]
    TransactionLockupFailed,
    #[serde(rename = "transaction.zeroconf.rejected")]
    TransactionZeroConfRejected,

    #[serde(rename = "channel.created")]
    ChannelCreated,

    #[serde(rename = "minerfee.paid")]
    MinerFeePaid,
}

impl SwapUpdateEvent {
    pub const ALL: [SwapUpdateEvent; 17] = [
        Self::SwapCreated,
        Self::SwapExpired,
        Self::InvoiceSet,
        Self::InvoicePending,
        Self::InvoicePaid,
        Self::InvoiceFailedToPay,
        Self::InvoiceSettled,
        Self::InvoiceExpired,
        Self::TransactionMempool,
        Self::TransactionConfirmed,
        Self::TransactionClaimed,
        Self::TransactionRefunded,
        Self::TransactionFailed,
        Self::TransactionLockupFailed,
        Self::TransactionZeroConfRejected,
        Self::ChannelCreated,
        Self::MinerFeePaid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SwapCreated => "swap.created",
            Self::SwapExpired => "swap.expired",
            Self::InvoiceSet => "invoice.set",
            Self::InvoicePending => "invoice.pending",
            Self::InvoicePaid => "invoice.paid",
            Self::InvoiceFailedToPay => "invoice.failedToPay",
            Self::InvoiceSettled => "invoice.settled",
            Self::InvoiceExpired => "invoice.expired",
            Self::TransactionMempool => "transaction.mempool",
            Self::TransactionConfirmed => "transaction.confirmed",
            Self::TransactionClaimed => "transaction.claimed",
            Self::TransactionRefunded => "transaction.refunded",
            Self::TransactionFailed => "transaction.failed",
            Self::TransactionLockupFailed => "transaction.lockupFailed",
            Self::TransactionZeroConfRejected => "transaction.zeroconf.rejected",
            Self::ChannelCreated => "channel.created",
            Self::MinerFeePaid => "minerfee.paid",
        }
    }
}

impl fmt::Display for SwapUpdateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown swap status: {0}")]
pub struct UnknownSwapStatus(pub String);

impl FromStr for SwapUpdateEvent {
    type Err = UnknownSwapStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| UnknownSwapStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
    pub funding_transaction_id: String,
    pub funding_transaction_vout: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
    /// Estimated blocks until confirmation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<u32>,
}

/// Latest known status of a swap plus its status-dependent payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapUpdate {
    pub status: SwapUpdateEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelInfo>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub zero_conf_rejected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionInfo>,
}

impl SwapUpdate {
    pub fn new(status: SwapUpdateEvent) -> Self {
        Self {
            status,
            channel: None,
            zero_conf_rejected: false,
            failure_reason: None,
            transaction: None,
        }
    }

    pub fn with_channel(mut self, channel: ChannelInfo) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_failure_reason(mut self, reason: Option<String>) -> Self {
        self.failure_reason = reason;
        self
    }

    pub fn with_transaction(mut self, transaction: TransactionInfo) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn with_zero_conf_rejected(mut self) -> Self {
        self.zero_conf_rejected = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_names_match_serde_names() {
        for event in SwapUpdateEvent::ALL {
            let json = serde_json::to_string(&event).unwrap();
            assert_eq!(json, format!("\"{}\"", event.as_str()));
            assert_eq!(event.as_str().parse::<SwapUpdateEvent>().unwrap(), event);
        }
        assert!("transaction.unknown".parse::<SwapUpdateEvent>().is_err());
    }

    #[test]
    fn update_omits_absent_payload() {
        let update = SwapUpdate::new(SwapUpdateEvent::TransactionMempool)
            .with_zero_conf_rejected()
            .with_transaction(TransactionInfo {
                id: "ab".to_string(),
                hex: None,
                eta: None,
            });
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "transaction.mempool",
                "zeroConfRejected": true,
                "transaction": { "id": "ab" },
            })
        );
    }
}
