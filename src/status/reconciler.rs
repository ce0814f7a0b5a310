use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt as _;
use futures_util::stream;

use super::lookup::{LookupError, TransactionLookup};
use super::{ChannelInfo, SwapUpdate, SwapUpdateEvent, TransactionInfo};
use crate::swap::{ReverseSwapRecord, SwapRecord, SwapStateStore};

/// Blocks until a reverse swap lockup in the mempool is expected to confirm.
pub const REVERSE_SWAP_MEMPOOL_ETA: u32 = 2;

const LOOKUP_CONCURRENCY: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("swap {swap_id} has status {status} but no channel creation record")]
    MissingChannelCreation {
        swap_id: String,
        status: SwapUpdateEvent,
    },

    #[error("swap id {0} is used by both a swap and a reverse swap")]
    DuplicateSwapId(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Rebuilds the latest status of every persisted swap after a restart.
pub struct StatusReconciler {
    store: Arc<dyn SwapStateStore>,
    lookup: Arc<dyn TransactionLookup>,
}

impl StatusReconciler {
    pub fn new(store: Arc<dyn SwapStateStore>, lookup: Arc<dyn TransactionLookup>) -> Self {
        Self { store, lookup }
    }

    /// Produces one `SwapUpdate` per persisted swap and reverse swap.
    ///
    /// Store failures, missing channel creation records and swap ids shared
    /// by a swap and a reverse swap abort the run;
    /// transaction lookup failures only strip the raw transaction from the
    /// affected reverse swap.
    pub async fn reconcile(&self) -> Result<HashMap<String, SwapUpdate>, ReconcileError> {
        let swaps = self.store.swaps()?;
        let reverse_swaps = self.store.reverse_swaps()?;

        let mut table = HashMap::with_capacity(swaps.len() + reverse_swaps.len());
        for swap in &swaps {
            table.insert(swap.id.clone(), self.reconcile_swap(swap)?);
        }

        let reverse_updates: Vec<(String, SwapUpdate)> = stream::iter(&reverse_swaps)
            .map(|reverse_swap| async move {
                (
                    reverse_swap.id.clone(),
                    self.reconcile_reverse_swap(reverse_swap).await,
                )
            })
            .buffer_unordered(LOOKUP_CONCURRENCY)
            .collect()
            .await;
        for (swap_id, update) in reverse_updates {
            if table.contains_key(&swap_id) {
                return Err(ReconcileError::DuplicateSwapId(swap_id));
            }
            table.insert(swap_id, update);
        }

        tracing::info!(
            swaps = swaps.len(),
            reverse_swaps = reverse_swaps.len(),
            "reconciled swap statuses"
        );
        Ok(table)
    }

    fn reconcile_swap(&self, swap: &SwapRecord) -> Result<SwapUpdate, ReconcileError> {
        match swap.status {
            SwapUpdateEvent::ChannelCreated => {
                let channel = self.store.channel_creation(&swap.id)?.ok_or_else(|| {
                    ReconcileError::MissingChannelCreation {
                        swap_id: swap.id.clone(),
                        status: swap.status,
                    }
                })?;
                Ok(
                    SwapUpdate::new(swap.status).with_channel(ChannelInfo {
                        funding_transaction_id: channel.funding_transaction_id,
                        funding_transaction_vout: channel.funding_transaction_vout,
                    }),
                )
            }
            SwapUpdateEvent::TransactionZeroConfRejected => {
                Ok(SwapUpdate::new(SwapUpdateEvent::TransactionMempool).with_zero_conf_rejected())
            }
            status => Ok(SwapUpdate::new(status).with_failure_reason(swap.failure_reason.clone())),
        }
    }

    async fn reconcile_reverse_swap(&self, reverse_swap: &ReverseSwapRecord) -> SwapUpdate {
        let status = reverse_swap.status;
        if !matches!(
            status,
            SwapUpdateEvent::TransactionMempool | SwapUpdateEvent::TransactionConfirmed
        ) {
            return SwapUpdate::new(status);
        }

        let Some(transaction_id) = reverse_swap.transaction_id.clone() else {
            tracing::warn!(
                swap_id = %reverse_swap.id,
                %status,
                "reverse swap has no lockup transaction id"
            );
            return SwapUpdate::new(status);
        };

        let currency = reverse_swap.chain_currency();
        let hex = match self
            .lookup
            .get_transaction_hex(currency, &transaction_id)
            .await
        {
            Ok(hex) => hex,
            Err(err) => {
                match &err {
                    LookupError::NotSupportedForCurrency(_) => {
                        tracing::debug!(swap_id = %reverse_swap.id, error = %err, "skipping transaction lookup");
                    }
                    _ => {
                        tracing::warn!(swap_id = %reverse_swap.id, error = %err, "transaction lookup failed");
                    }
                }
                return SwapUpdate::new(status).with_transaction(TransactionInfo {
                    id: transaction_id,
                    hex: None,
                    eta: None,
                });
            }
        };

        let eta = (status == SwapUpdateEvent::TransactionMempool).then_some(REVERSE_SWAP_MEMPOOL_ETA);
        SwapUpdate::new(status).with_transaction(TransactionInfo {
            id: transaction_id,
            hex: Some(hex),
            eta,
        })
    }
}
