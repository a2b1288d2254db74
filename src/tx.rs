//! Submission and receipt tracking for single transactions.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::abi::topic_to_address;
use crate::chain::{ReceiptSource, ReceiptWatcher, TxSubmitter};
use crate::core::{EthernityError, Result};
use crate::types::{Artifact, ArtifactExtraction, PendingTransaction, Receipt, TransactionIntent};

/// Default receipt watch window.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default delay between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Sign-and-broadcast for one intent at a time.
#[derive(Clone)]
pub struct TransactionSubmitter {
    signer: Arc<dyn TxSubmitter>,
}

impl std::fmt::Debug for TransactionSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSubmitter").finish_non_exhaustive()
    }
}

impl TransactionSubmitter {
    #[must_use]
    pub fn new(signer: Arc<dyn TxSubmitter>) -> Self {
        Self { signer }
    }

    /// Request a signature and broadcast. Fails without a hash when the user
    /// rejects or the node refuses the transaction.
    #[instrument(skip_all, fields(to = %intent.call().to, approval = intent.is_approval()))]
    pub async fn submit(&self, intent: TransactionIntent) -> Result<PendingTransaction> {
        let hash = self.signer.sign_and_broadcast(intent.call()).await?;
        info!(tx_hash = %hash, "Transaction broadcast");
        Ok(PendingTransaction {
            intent,
            hash,
            submitted_at: SystemTime::now(),
        })
    }
}

/// Turns a failed-status receipt into [`EthernityError::Reverted`].
pub fn ensure_success(receipt: Receipt) -> Result<Receipt> {
    if receipt.success {
        Ok(receipt)
    } else {
        warn!(tx_hash = %receipt.tx_hash, gas_used = receipt.gas_used, "Transaction reverted");
        Err(EthernityError::Reverted {
            tx_hash: receipt.tx_hash,
            gas_used: receipt.gas_used,
        })
    }
}

/// Address of a created contract, taken from the first log `emitter`
/// published with an indexed topic after the event signature.
///
/// Logs from other contracts (token transfers pulled by the same call) are
/// skipped.
#[must_use]
pub fn extract_created_address(receipt: &Receipt, emitter: Address) -> ArtifactExtraction {
    if receipt.logs.is_empty() {
        return ArtifactExtraction::Unparsed {
            reason: "receipt has no logs".to_string(),
        };
    }
    let found = receipt
        .logs
        .iter()
        .find(|log| log.address == emitter && log.topics.len() > 1);
    match found {
        Some(log) => {
            let address = topic_to_address(&log.topics[1].0);
            if address.is_zero() {
                ArtifactExtraction::Unparsed {
                    reason: "indexed address topic is zero".to_string(),
                }
            } else {
                ArtifactExtraction::Found(Artifact::ContractAddress(address))
            }
        }
        None => ArtifactExtraction::Unparsed {
            reason: format!(
                "none of {} log(s) from {emitter} has an indexed topic",
                receipt.logs.len()
            ),
        },
    }
}

/// [`ReceiptWatcher`] that polls a [`ReceiptSource`] at a fixed interval.
///
/// Lookup errors are logged and retried until the deadline; only the
/// deadline itself ends the watch with an error.
pub struct PollingReceiptWatcher<S> {
    source: S,
    poll_interval: Duration,
}

impl<S: ReceiptSource> PollingReceiptWatcher<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the delay between polls
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

#[async_trait]
impl<S: ReceiptSource> ReceiptWatcher for PollingReceiptWatcher<S> {
    #[instrument(skip(self), fields(tx_hash = %tx_hash))]
    async fn wait_for_receipt(&self, tx_hash: B256, timeout: Duration) -> Result<Receipt> {
        let start = tokio::time::Instant::now();
        let deadline = start + timeout;

        info!(timeout_secs = timeout.as_secs(), "Waiting for receipt");

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, self.source.fetch_receipt(tx_hash)).await {
                Ok(Ok(Some(receipt))) => {
                    info!(
                        block = ?receipt.block_number,
                        gas_used = receipt.gas_used,
                        success = receipt.success,
                        "Receipt received"
                    );
                    return Ok(receipt);
                }
                Ok(Ok(None)) => debug!("Not mined yet, continuing poll"),
                Ok(Err(e)) => warn!(error = %e, "Receipt lookup failed, retrying"),
                Err(_) => {}
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                warn!("Receipt watch timed out");
                return Err(EthernityError::ConfirmationTimeout {
                    tx_hash,
                    waited: now - start,
                });
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
