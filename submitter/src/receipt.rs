use std::time::Duration;

use derive_new::new;
use ethers::types::H256;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::{
    provider::{LedgerProvider, Receipt},
    utils::exponential_backoff,
    SubmitterError,
};

const MAX_WAIT_ATTEMPTS: u32 = 10;
const WAIT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const CONFIRMATIONS: usize = 1;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InclusionConfig {
    pub max_attempts: u32,
    /// Bound on a single wait for inclusion.
    pub wait_timeout: Duration,
    pub confirmations: usize,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for InclusionConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_WAIT_ATTEMPTS,
            wait_timeout: WAIT_TIMEOUT,
            confirmations: CONFIRMATIONS,
            backoff_base: BACKOFF_BASE,
            backoff_cap: BACKOFF_CAP,
        }
    }
}

/// Confirms inclusion of a submitted transaction.
///
/// The node's wait channel is not trusted on its own: when a wait times out
/// the waiter probes the transaction and its receipt directly, and a final
/// receipt lookup runs once the wait budget is spent.
#[derive(Clone, Debug, Default, new)]
pub struct ReceiptWaiter {
    config: InclusionConfig,
}

impl ReceiptWaiter {
    pub fn config(&self) -> &InclusionConfig {
        &self.config
    }

    #[instrument(skip(self, provider))]
    pub async fn wait(
        &self,
        provider: &dyn LedgerProvider,
        hash: H256,
    ) -> Result<Receipt, SubmitterError> {
        for attempt in 0..self.config.max_attempts {
            let result = provider
                .wait_for_inclusion(hash, self.config.confirmations, self.config.wait_timeout)
                .await;
            match result {
                Ok(receipt) => {
                    info!(attempt, block_number = receipt.block_number, status = ?receipt.status, "Transaction included");
                    return Ok(receipt);
                }
                Err(SubmitterError::ConfirmationTimeout(_)) => {
                    warn!(attempt, "Timed out waiting for inclusion, probing transaction status");
                    if let Some(receipt) = self.probe(provider, hash).await {
                        info!(attempt, block_number = receipt.block_number, "Found receipt through status probe");
                        return Ok(receipt);
                    }
                }
                Err(SubmitterError::TxNotFound(_)) => {
                    warn!(attempt, "Transaction not found, it may have been dropped from the pending set");
                }
                Err(err) => {
                    warn!(attempt, ?err, "Error waiting for inclusion");
                }
            }

            if attempt + 1 < self.config.max_attempts {
                let backoff =
                    exponential_backoff(attempt, self.config.backoff_base, self.config.backoff_cap);
                debug!(attempt, ?backoff, "Waiting before next inclusion check");
                sleep(backoff).await;
            }
        }

        match provider.get_transaction_receipt(hash).await {
            Ok(Some(receipt)) => {
                info!(block_number = receipt.block_number, "Found receipt on final lookup");
                Ok(receipt)
            }
            Ok(None) => {
                warn!(attempts = self.config.max_attempts, "Receipt not found after exhausting inclusion checks");
                Err(SubmitterError::ReceiptNotFound(hash))
            }
            Err(err) => {
                warn!(attempts = self.config.max_attempts, ?err, "Final receipt lookup failed");
                Err(SubmitterError::ReceiptNotFound(hash))
            }
        }
    }

    /// Looks the transaction and its receipt up directly. Probe failures are
    /// logged and read as "still pending".
    async fn probe(&self, provider: &dyn LedgerProvider, hash: H256) -> Option<Receipt> {
        match provider.transaction_exists(hash).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(?hash, "Transaction is unknown to the node");
                return None;
            }
            Err(err) => {
                warn!(?hash, ?err, "Failed to look up transaction");
                return None;
            }
        }

        match provider.get_transaction_receipt(hash).await {
            Ok(Some(receipt)) => return Some(receipt),
            Ok(None) => {}
            Err(err) => {
                warn!(?hash, ?err, "Failed to look up receipt");
                return None;
            }
        }

        match provider.get_block_number().await {
            Ok(block) => debug!(?hash, block, "Transaction still pending"),
            Err(err) => debug!(?hash, ?err, "Transaction still pending, block number unavailable"),
        }
        None
    }
}
