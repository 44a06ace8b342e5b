use ethers::types::H256;

#[derive(Debug, thiserror::Error)]
pub enum SubmitterError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Nonce has already been used: {0}")]
    StaleNonce(String),
    #[error("Replacement transaction underpriced: {0}")]
    ReplacementUnderpriced(String),
    #[error("Node rejected the submission as a replay: {0}")]
    ReplayedSubmission(String),
    #[error("Transaction underpriced: {0}")]
    Underpriced(String),
    #[error("Execution reverted: {0}")]
    Reverted(String),
    #[error("Timed out waiting for inclusion of {0:?}")]
    ConfirmationTimeout(H256),
    #[error("Transaction {0:?} not found")]
    TxNotFound(H256),
    #[error("The transaction {0:?} reverted")]
    TxReverted(H256),
    #[error("Submission exhausted after {attempts} attempts, last error: {last_error}")]
    SubmissionExhausted { attempts: u32, last_error: String },
    #[error("Receipt for {0:?} not found")]
    ReceiptNotFound(H256),
    #[error("Signer error: {0}")]
    SignerError(String),
    #[error("{0}")]
    EyreError(#[from] eyre::Report),
}

impl SubmitterError {
    /// Errors after which the locally tracked nonce can no longer be trusted.
    pub fn invalidates_nonce(&self) -> bool {
        matches!(
            self,
            SubmitterError::StaleNonce(_) | SubmitterError::ReplacementUnderpriced(_)
        )
    }

    /// Errors which say the call itself would revert with the current inputs.
    pub fn is_revert(&self) -> bool {
        matches!(
            self,
            SubmitterError::Reverted(_) | SubmitterError::TxReverted(_)
        )
    }
}
