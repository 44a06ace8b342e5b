use std::time::Duration;

use derive_new::new;
use ethers::types::H256;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

use crate::{
    call::PendingCall,
    gas_price::{EscalationConfig, FeeEscalator},
    nonce::NonceTracker,
    provider::LedgerProvider,
    utils::exponential_backoff,
    SubmitterError,
};

const MAX_SUBMISSION_ATTEMPTS: u32 = 5;
const REPLAY_COOLDOWN: Duration = Duration::from_secs(30);
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionConfig {
    pub max_attempts: u32,
    /// Pause after the node rejects a submission as a replay.
    pub replay_cooldown: Duration,
    /// Backoff before attempt `n + 1` is `backoff_base * 2^n`.
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub escalation: EscalationConfig,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_SUBMISSION_ATTEMPTS,
            replay_cooldown: REPLAY_COOLDOWN,
            backoff_base: BACKOFF_BASE,
            backoff_cap: BACKOFF_CAP,
            escalation: EscalationConfig::default(),
        }
    }
}

/// Sends a signed call, recovering from the rejection classes the node is
/// known to produce.
///
/// Confirmation is not its concern: the nonce tracker is left untouched on
/// success, so the caller advances it once the call is durably observed.
#[derive(Clone, Debug, Default, new)]
pub struct TransactionSubmitter {
    config: SubmissionConfig,
}

impl TransactionSubmitter {
    pub fn config(&self) -> &SubmissionConfig {
        &self.config
    }

    /// Submits `call`, starting from its current fee caps as the baseline.
    ///
    /// On return `call` holds the nonce and fee caps of the last attempt.
    #[instrument(skip_all, fields(to = ?call.to, nonce = %call.nonce))]
    pub async fn submit(
        &self,
        provider: &dyn LedgerProvider,
        nonces: &mut NonceTracker,
        call: &mut PendingCall,
    ) -> Result<H256, SubmitterError> {
        let mut escalator = FeeEscalator::new(call.fees, self.config.escalation);
        let mut last_error = None;

        for attempt in 0..self.config.max_attempts {
            call.fees = escalator.current();
            let err = match provider.send(call).await {
                Ok(hash) => {
                    info!(?hash, attempt, nonce = %call.nonce, fees = ?call.fees, "Submitted transaction");
                    return Ok(hash);
                }
                Err(err) => err,
            };
            let remaining = self.config.max_attempts.saturating_sub(attempt + 1);

            match &err {
                SubmitterError::ReplayedSubmission(_) => {
                    warn!(?err, attempt, "Node rejected submission as a replay, cooling down");
                    if remaining > 0 {
                        sleep(self.config.replay_cooldown).await;
                    }
                }
                err if err.invalidates_nonce() => {
                    let nonce = nonces.resync().await?;
                    warn!(?err, attempt, old_nonce = %call.nonce, new_nonce = %nonce, "Nonce is stale, retrying with resynchronized nonce");
                    call.nonce = nonce;
                }
                _ => {
                    escalator.escalate();
                    warn!(?err, attempt, fees = ?escalator.current(), "Error submitting transaction. Retrying...");
                    if remaining > 0 {
                        let backoff = exponential_backoff(
                            attempt,
                            self.config.backoff_base,
                            self.config.backoff_cap,
                        );
                        sleep(backoff).await;
                    }
                }
            }
            last_error = Some(err);
        }

        let last_error = last_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "no attempts were made".to_string());
        warn!(attempts = self.config.max_attempts, %last_error, "Submission attempts exhausted");
        Err(SubmitterError::SubmissionExhausted {
            attempts: self.config.max_attempts,
            last_error,
        })
    }
}
