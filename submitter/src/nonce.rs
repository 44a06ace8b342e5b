use std::sync::Arc;

use ethers::types::{Address, U256};
use tracing::{info, warn};

use crate::{provider::LedgerProvider, SubmitterError};

/// Next-nonce bookkeeping for one account.
///
/// Owned by the task driving the account, so it is never shared between two
/// concurrent submitters. Seeded lazily from the node's pending count and
/// advanced locally afterwards. The tracked value never decreases.
#[derive(Debug)]
pub struct NonceTracker {
    provider: Arc<dyn LedgerProvider>,
    next_nonce: Option<U256>,
}

impl NonceTracker {
    pub fn new(provider: Arc<dyn LedgerProvider>) -> Self {
        Self {
            provider,
            next_nonce: None,
        }
    }

    pub fn address(&self) -> Address {
        self.provider.address()
    }

    /// The nonce to use for the next call.
    pub async fn current_nonce(&mut self) -> Result<U256, SubmitterError> {
        match self.next_nonce {
            Some(nonce) => Ok(nonce),
            None => self.resync().await,
        }
    }

    /// Refetches the pending nonce from the node.
    ///
    /// Fetch failures are returned to the caller and not retried here.
    pub async fn resync(&mut self) -> Result<U256, SubmitterError> {
        let node_nonce = self.provider.pending_nonce().await?;
        let next_nonce = match self.next_nonce {
            Some(local) if local > node_nonce => {
                warn!(
                    address = ?self.address(),
                    local_nonce = %local,
                    %node_nonce,
                    "Node reports a lower pending nonce than already used, keeping local nonce"
                );
                local
            }
            _ => node_nonce,
        };
        info!(address = ?self.address(), nonce = %next_nonce, "Synchronized nonce with node");
        self.next_nonce = Some(next_nonce);
        Ok(next_nonce)
    }

    /// Marks `nonce` as spent. Advancing past the same nonce twice is a no-op.
    pub fn advance_past(&mut self, nonce: U256) {
        let candidate = nonce.saturating_add(U256::one());
        let next_nonce = match self.next_nonce {
            Some(local) => local.max(candidate),
            None => candidate,
        };
        self.next_nonce = Some(next_nonce);
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::test_utils::MockLedgerProvider;

    fn provider_returning(nonces: Vec<u64>) -> Arc<dyn LedgerProvider> {
        let mut provider = MockLedgerProvider::new();
        let mut nonces = nonces.into_iter();
        provider.expect_address().return_const(Address::zero());
        provider
            .expect_pending_nonce()
            .times(nonces.len())
            .returning(move || Ok(U256::from(nonces.next().unwrap_or_default())));
        Arc::new(provider)
    }

    #[tokio::test]
    async fn seeds_from_node_once() {
        let mut tracker = NonceTracker::new(provider_returning(vec![51]));

        assert_eq!(tracker.current_nonce().await.unwrap(), U256::from(51));
        assert_eq!(tracker.current_nonce().await.unwrap(), U256::from(51));
    }

    #[tokio::test]
    async fn advances_past_confirmed_nonce_exactly_once() {
        let mut tracker = NonceTracker::new(provider_returning(vec![10]));
        let nonce = tracker.current_nonce().await.unwrap();

        tracker.advance_past(nonce);
        tracker.advance_past(nonce);

        assert_eq!(tracker.current_nonce().await.unwrap(), U256::from(11));
    }

    #[tokio::test]
    async fn resync_adopts_higher_node_nonce() {
        let mut tracker = NonceTracker::new(provider_returning(vec![3, 9]));
        tracker.current_nonce().await.unwrap();

        assert_eq!(tracker.resync().await.unwrap(), U256::from(9));
        assert_eq!(tracker.current_nonce().await.unwrap(), U256::from(9));
    }

    #[tokio::test]
    #[traced_test]
    async fn resync_never_decrements() {
        let mut tracker = NonceTracker::new(provider_returning(vec![5, 4]));
        let nonce = tracker.current_nonce().await.unwrap();
        tracker.advance_past(nonce);

        assert_eq!(tracker.resync().await.unwrap(), U256::from(6));
        assert!(logs_contain("keeping local nonce"));
    }

    #[tokio::test]
    async fn resync_failure_is_propagated() {
        let mut provider = MockLedgerProvider::new();
        provider.expect_address().return_const(Address::zero());
        provider
            .expect_pending_nonce()
            .times(1)
            .returning(|| Err(SubmitterError::NetworkError("rate limited".into())));
        let mut tracker = NonceTracker::new(Arc::new(provider));

        let result = tracker.resync().await;

        assert!(matches!(result, Err(SubmitterError::NetworkError(_))));
    }
}
