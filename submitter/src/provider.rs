use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256};

use crate::{call::PendingCall, error::SubmitterError};

pub use evm::{classify_rpc_error, EthersLedgerProvider};

mod evm;

/// Whether an included transaction executed successfully.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// Ledger confirmed outcome of a submitted call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: H256,
    pub block_number: u64,
    pub status: ReceiptStatus,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

impl TryFrom<&TransactionReceipt> for Receipt {
    type Error = SubmitterError;

    fn try_from(receipt: &TransactionReceipt) -> Result<Self, Self::Error> {
        // a receipt without a block number has not been included yet
        let block_number = receipt
            .block_number
            .ok_or(SubmitterError::TxNotFound(receipt.transaction_hash))?
            .as_u64();
        let status = match receipt.status.map(|s| s.as_u64()) {
            Some(0) => ReceiptStatus::Reverted,
            _ => ReceiptStatus::Success,
        };
        Ok(Self {
            tx_hash: receipt.transaction_hash,
            block_number,
            status,
        })
    }
}

/// The ledger node as seen by one signing account.
///
/// Implementations classify node failures into [`SubmitterError`] variants;
/// callers dispatch on the variant only.
#[async_trait]
pub trait LedgerProvider: Send + Sync + Debug {
    /// Address of the signing account.
    fn address(&self) -> Address;

    /// Read-only contract call.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, SubmitterError>;

    /// Number of transactions sent by the account, including pending ones.
    async fn pending_nonce(&self) -> Result<U256, SubmitterError>;

    /// Estimate the gas used by `data` sent to `to` from the signing account.
    async fn estimate_gas(&self, to: Address, data: Bytes) -> Result<U256, SubmitterError>;

    /// Sign and submit the call, returning its transaction hash.
    async fn send(&self, call: &PendingCall) -> Result<H256, SubmitterError>;

    async fn get_transaction_receipt(&self, hash: H256)
        -> Result<Option<Receipt>, SubmitterError>;

    /// Wait up to `timeout` for the transaction to be included with
    /// `confirmations` confirmations.
    async fn wait_for_inclusion(
        &self,
        hash: H256,
        confirmations: usize,
        timeout: Duration,
    ) -> Result<Receipt, SubmitterError>;

    /// Whether the node knows about the transaction at all.
    async fn transaction_exists(&self, hash: H256) -> Result<bool, SubmitterError>;

    async fn get_block_number(&self) -> Result<u64, SubmitterError>;
}
