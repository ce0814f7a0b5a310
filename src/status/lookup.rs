use std::collections::HashMap;
use std::str::FromStr as _;

use async_trait::async_trait;
use bitcoin::{Transaction, Txid};
use reqwest::{Client, StatusCode};

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("transaction lookup not supported for currency {0}")]
    NotSupportedForCurrency(String),

    #[error("transaction not found: {0}")]
    NotFound(String),

    #[error("invalid transaction {transaction_id}: {reason}")]
    Invalid {
        transaction_id: String,
        reason: String,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Resolves the raw encoding of on-chain transactions.
#[async_trait]
pub trait TransactionLookup: Send + Sync {
    async fn get_transaction_hex(
        &self,
        currency: &str,
        transaction_id: &str,
    ) -> Result<String, LookupError>;
}

/// Fetches raw transactions from Esplora-compatible HTTP APIs, one base URL
/// per currency symbol.
#[derive(Debug, Clone)]
pub struct EsploraTransactionLookup {
    client: Client,
    endpoints: HashMap<String, String>,
}

impl EsploraTransactionLookup {
    pub fn new(endpoints: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            client: Client::new(),
            endpoints: endpoints
                .into_iter()
                .map(|(symbol, url)| (symbol, url.trim_end_matches('/').to_string()))
                .collect(),
        }
    }

    pub fn supports(&self, currency: &str) -> bool {
        self.endpoints.contains_key(currency)
    }
}

#[async_trait]
impl TransactionLookup for EsploraTransactionLookup {
    async fn get_transaction_hex(
        &self,
        currency: &str,
        transaction_id: &str,
    ) -> Result<String, LookupError> {
        let base_url = self
            .endpoints
            .get(currency)
            .ok_or_else(|| LookupError::NotSupportedForCurrency(currency.to_string()))?;

        let txid = Txid::from_str(transaction_id).map_err(|e| LookupError::Invalid {
            transaction_id: transaction_id.to_string(),
            reason: e.to_string(),
        })?;

        let url = format!("{base_url}/tx/{txid}/hex");
        let resp = self.client.get(&url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(LookupError::NotFound(transaction_id.to_string()));
        }
        let body = resp.error_for_status()?.text().await?;

        let tx_hex = body.trim().to_string();
        verify_transaction_hex(&txid, &tx_hex)?;
        Ok(tx_hex)
    }
}

/// Checks that `tx_hex` decodes to the transaction with id `txid`.
pub fn verify_transaction_hex(txid: &Txid, tx_hex: &str) -> Result<(), LookupError> {
    let invalid = |reason: String| LookupError::Invalid {
        transaction_id: txid.to_string(),
        reason,
    };

    let bytes = hex::decode(tx_hex).map_err(|e| invalid(format!("decode hex: {e}")))?;
    let tx: Transaction = bitcoin::consensus::deserialize(&bytes)
        .map_err(|e| invalid(format!("decode transaction: {e}")))?;

    let actual = tx.compute_txid();
    if actual != *txid {
        return Err(invalid(format!("hex encodes transaction {actual}")));
    }
    Ok(())
}
