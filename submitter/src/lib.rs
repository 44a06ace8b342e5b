//! Transaction submission and retry engine for EVM accounts.
//!
//! A call travels through the [`TransactionSubmitter`], which recovers from
//! the rejection classes a node produces, and then through the
//! [`ReceiptWaiter`], which confirms inclusion even when the node's wait
//! channel drops it. Nonces are tracked per account by a [`NonceTracker`]
//! owned by whoever drives that account.

#![deny(clippy::unwrap_used, clippy::panic)]

pub use call::{pad_gas_limit, PendingCall};
pub use error::SubmitterError;
pub use gas_price::{EscalationConfig, FeeCaps, FeeEscalator};
pub use nonce::NonceTracker;
pub use provider::{
    classify_rpc_error, EthersLedgerProvider, LedgerProvider, Receipt, ReceiptStatus,
};
pub use receipt::{InclusionConfig, ReceiptWaiter};
pub use sender::{SubmissionConfig, TransactionSubmitter};
pub use utils::exponential_backoff;

mod call;
mod error;
mod gas_price;
mod nonce;
mod provider;
mod receipt;
mod sender;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
mod utils;
