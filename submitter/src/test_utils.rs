//! Mocks for the ledger provider seam, shared with downstream crates through
//! the `test-utils` feature.

use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};

use crate::{
    call::PendingCall,
    provider::{LedgerProvider, Receipt, ReceiptStatus},
    SubmitterError,
};

mockall::mock! {
    pub LedgerProvider {}

    #[async_trait]
    impl LedgerProvider for LedgerProvider {
        /// Address of the signing account
        fn address(&self) -> Address;

        /// Read-only contract call
        async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, SubmitterError>;

        /// Pending transaction count of the signing account
        async fn pending_nonce(&self) -> Result<U256, SubmitterError>;

        /// Estimate the gas used by a call
        async fn estimate_gas(&self, to: Address, data: Bytes) -> Result<U256, SubmitterError>;

        /// Sign and submit a call
        async fn send(&self, call: &PendingCall) -> Result<H256, SubmitterError>;

        async fn get_transaction_receipt(
            &self,
            hash: H256,
        ) -> Result<Option<Receipt>, SubmitterError>;

        async fn wait_for_inclusion(
            &self,
            hash: H256,
            confirmations: usize,
            timeout: Duration,
        ) -> Result<Receipt, SubmitterError>;

        async fn transaction_exists(&self, hash: H256) -> Result<bool, SubmitterError>;

        async fn get_block_number(&self) -> Result<u64, SubmitterError>;
    }
}

/// A successful receipt for `hash` included in `block_number`.
pub fn dummy_receipt(hash: H256, block_number: u64) -> Receipt {
    Receipt {
        tx_hash: hash,
        block_number,
        status: ReceiptStatus::Success,
    }
}

impl std::fmt::Debug for MockLedgerProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLedgerProvider").finish()
    }
}
