use std::fmt::{Debug, Display};
use std::time::Duration;

use async_trait::async_trait;
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Middleware, PendingTransaction, Provider},
    signers::{LocalWallet, Signer},
    types::{
        transaction::eip2718::TypedTransaction, Address, BlockNumber, Bytes, TransactionRequest,
        H256, U256,
    },
};
use tracing::{debug, instrument};

use crate::{call::PendingCall, error::SubmitterError};

use super::{LedgerProvider, Receipt};

type SignedClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// [`LedgerProvider`] backed by an ethers JSON-RPC provider and a local wallet.
pub struct EthersLedgerProvider {
    client: SignedClient,
    address: Address,
}

impl EthersLedgerProvider {
    pub fn new(provider: Provider<Http>, wallet: LocalWallet, chain_id: u64) -> Self {
        let wallet = wallet.with_chain_id(chain_id);
        let address = wallet.address();
        Self {
            client: SignerMiddleware::new(provider, wallet),
            address,
        }
    }

    fn read_request(&self, to: Address, data: Bytes) -> TypedTransaction {
        TransactionRequest::new()
            .from(self.address)
            .to(to)
            .data(data)
            .into()
    }
}

impl Debug for EthersLedgerProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the signer
        f.debug_struct("EthersLedgerProvider")
            .field("address", &self.address)
            .finish()
    }
}

#[async_trait]
impl LedgerProvider for EthersLedgerProvider {
    fn address(&self) -> Address {
        self.address
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, SubmitterError> {
        let tx = self.read_request(to, data);
        self.client
            .call(&tx, None)
            .await
            .map_err(|err| classify_rpc_error(&err))
    }

    async fn pending_nonce(&self) -> Result<U256, SubmitterError> {
        self.client
            .get_transaction_count(self.address, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|err| classify_rpc_error(&err))
    }

    async fn estimate_gas(&self, to: Address, data: Bytes) -> Result<U256, SubmitterError> {
        let tx = self.read_request(to, data);
        self.client
            .estimate_gas(&tx, None)
            .await
            .map_err(|err| classify_rpc_error(&err))
    }

    #[instrument(skip_all, fields(nonce = %call.nonce, to = ?call.to))]
    async fn send(&self, call: &PendingCall) -> Result<H256, SubmitterError> {
        let tx = call.to_typed_transaction(self.address);
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|err| classify_rpc_error(&err))?;
        let hash = pending.tx_hash();
        debug!(?hash, "Node accepted transaction");
        Ok(hash)
    }

    async fn get_transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<Receipt>, SubmitterError> {
        let receipt = self
            .client
            .get_transaction_receipt(hash)
            .await
            .map_err(|err| classify_rpc_error(&err))?;
        match receipt {
            Some(receipt) if receipt.block_number.is_some() => Ok(Some((&receipt).try_into()?)),
            _ => Ok(None),
        }
    }

    async fn wait_for_inclusion(
        &self,
        hash: H256,
        confirmations: usize,
        timeout: Duration,
    ) -> Result<Receipt, SubmitterError> {
        let pending = PendingTransaction::new(hash, self.client.provider())
            .confirmations(confirmations);

        let receipt = tokio::time::timeout(timeout, pending)
            .await
            .map_err(|_| SubmitterError::ConfirmationTimeout(hash))?
            .map_err(|err| classify_rpc_error(&err))?
            // the pending transaction resolves to `None` once the node drops it
            .ok_or(SubmitterError::TxNotFound(hash))?;

        (&receipt).try_into()
    }

    async fn transaction_exists(&self, hash: H256) -> Result<bool, SubmitterError> {
        let tx = self
            .client
            .get_transaction(hash)
            .await
            .map_err(|err| classify_rpc_error(&err))?;
        Ok(tx.is_some())
    }

    async fn get_block_number(&self) -> Result<u64, SubmitterError> {
        self.client
            .get_block_number()
            .await
            .map(|n| n.as_u64())
            .map_err(|err| classify_rpc_error(&err))
    }
}

/// Maps a node or middleware failure onto the submission error taxonomy.
///
/// This is the only place where node messages are inspected.
pub fn classify_rpc_error(err: &impl Display) -> SubmitterError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    let contains_any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if contains_any(&["tx_replay_attack", "already known"]) {
        SubmitterError::ReplayedSubmission(message)
    } else if contains_any(&["replacement transaction underpriced", "replacement_underpriced"]) {
        SubmitterError::ReplacementUnderpriced(message)
    } else if contains_any(&[
        "nonce too low",
        "nonce has already been used",
        "nonce_expired",
        "invalid nonce",
    ]) {
        SubmitterError::StaleNonce(message)
    } else if contains_any(&[
        "transaction underpriced",
        "fee too low",
        "max fee per gas less than block base fee",
        "insufficient_gas",
        "gas_too_low",
    ]) {
        SubmitterError::Underpriced(message)
    } else if contains_any(&["execution reverted", "custom error", "revert"]) {
        SubmitterError::Reverted(message)
    } else {
        SubmitterError::NetworkError(message)
    }
}
