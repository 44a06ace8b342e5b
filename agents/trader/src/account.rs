use std::fmt::{self, Display};

use ethers::{abi::AbiError, types::H256};
use submitter::SubmitterError;

pub use task::{Account, TaskContext, TaskPolicy};

pub mod sizing;
mod task;

#[cfg(test)]
mod tests;

/// The states an account task moves through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskState {
    CheckBalance,
    ClaimIfZero,
    Approve,
    Trade,
}

impl Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::CheckBalance => "check_balance",
            TaskState::ClaimIfZero => "claim",
            TaskState::Approve => "approve",
            TaskState::Trade => "trade",
        };
        f.write_str(name)
    }
}

/// Terminal result of one account task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The trade landed. `block_number` is `None` when the receipt was lost
    /// and the trade was confirmed through the account's balance instead.
    Traded {
        tx_hash: H256,
        block_number: Option<u64>,
    },
    /// The balance was too low to trade. Not an error.
    Skipped { balance: String },
    Failed { state: TaskState, reason: String },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Traded { .. })
    }
}

/// Failure of a single step of an account task.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Submitter(#[from] SubmitterError),
    #[error("Contract call encoding error: {0}")]
    Abi(#[from] AbiError),
    #[error("Proof unavailable: {0}")]
    ProofUnavailable(eyre::Report),
    /// Gas estimation of a trade reverted: the proof expired or the market
    /// moved.
    #[error("Trade would revert, proof is likely stale: {0}")]
    ProofStale(SubmitterError),
    #[error("Token reports unsupported decimals ({0})")]
    UnsupportedDecimals(u8),
    #[error("Receipt for {0:?} was lost and the allowance is still insufficient")]
    ApprovalUnconfirmed(H256),
    #[error("Receipt for {0:?} was lost and the balance did not drop by the trade size")]
    TradeUnconfirmed(H256),
    #[error("Receipt for {0:?} was lost")]
    Unconfirmed(H256),
}
