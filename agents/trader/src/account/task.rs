use std::{collections::HashSet, sync::Arc, time::Duration};

use ethers::types::{Address, Bytes, H256, U256};
use rand::{seq::SliceRandom, Rng};
use submitter::{
    pad_gas_limit, FeeCaps, LedgerProvider, NonceTracker, PendingCall, Receipt, ReceiptWaiter,
    SubmitterError, TransactionSubmitter,
};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    contracts::{self, OpenPosition},
    proof::FetchesProof,
    settings::{ContractAddresses, TradingPair},
};

use super::{
    sizing::{trade_size, TokenAmount},
    StepError, TaskOutcome, TaskState,
};

const MAX_TOKEN_DECIMALS: u8 = 36;

// gas limit = estimate * numerator / denominator
const APPROVE_GAS_MULTIPLIER: (u64, u64) = (15, 10);
const CLAIM_GAS_MULTIPLIER: (u64, u64) = (12, 10);
const TRADE_GAS_MULTIPLIER: (u64, u64) = (13, 10);

/// Retry budgets and pauses of the approve and trade states.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskPolicy {
    pub approve_attempts: u32,
    pub approve_retry_delay: Duration,
    pub trade_attempts: u32,
    /// Pause after gas estimation of a trade reverted.
    pub proof_stale_cooldown: Duration,
    /// Pause after the proof service returned nothing usable.
    pub missing_proof_delay: Duration,
    pub trade_retry_base: Duration,
    pub trade_retry_step: Duration,
    pub trade_retry_cap: Duration,
}

impl Default for TaskPolicy {
    fn default() -> Self {
        Self {
            approve_attempts: 5,
            approve_retry_delay: Duration::from_secs(3),
            trade_attempts: 100,
            proof_stale_cooldown: Duration::from_secs(5),
            missing_proof_delay: Duration::from_secs(3),
            trade_retry_base: Duration::from_secs(5),
            trade_retry_step: Duration::from_secs(2),
            trade_retry_cap: Duration::from_secs(15),
        }
    }
}

impl TaskPolicy {
    /// Pause after the `attempt`th (1-based) failed trade attempt.
    pub fn trade_retry_delay(&self, attempt: u32) -> Duration {
        self.trade_retry_step
            .saturating_mul(attempt)
            .saturating_add(self.trade_retry_base)
            .min(self.trade_retry_cap)
    }
}

/// Read-only collaborators shared by every account task of a run.
#[derive(Debug)]
pub struct TaskContext {
    pub contracts: ContractAddresses,
    pub pairs: Vec<TradingPair>,
    pub fees: FeeCaps,
    pub chain_id: u64,
    pub proofs: Arc<dyn FetchesProof>,
    pub submitter: TransactionSubmitter,
    pub waiter: ReceiptWaiter,
    pub policy: TaskPolicy,
}

enum Submission {
    Confirmed(Receipt),
    /// Sent, but no receipt could be obtained.
    Lost(H256),
}

/// One account and the state owned by the task driving it.
///
/// Built fresh for every round, so the nonce is always seeded from the node
/// before the first submission.
#[derive(Debug)]
pub struct Account {
    index: usize,
    provider: Arc<dyn LedgerProvider>,
    nonces: NonceTracker,
    approved_spenders: HashSet<Address>,
    decimals: Option<u8>,
}

impl Account {
    pub fn new(index: usize, provider: Arc<dyn LedgerProvider>) -> Self {
        Self {
            index,
            nonces: NonceTracker::new(provider.clone()),
            provider,
            approved_spenders: HashSet::new(),
            decimals: None,
        }
    }

    pub fn address(&self) -> Address {
        self.provider.address()
    }

    /// Drives the account through balance check, claim, approval and trade.
    pub async fn run(mut self, ctx: &TaskContext) -> TaskOutcome {
        let mut state = TaskState::CheckBalance;
        let mut claimed = false;

        loop {
            debug!(index = self.index, %state, "Entering state");
            state = match state {
                TaskState::CheckBalance => match self.balance(ctx).await {
                    Ok(balance) if balance.is_zero() && !claimed => {
                        info!("Token balance is zero, claiming from faucet");
                        TaskState::ClaimIfZero
                    }
                    Ok(balance) => {
                        info!(%balance, "Token balance");
                        TaskState::Approve
                    }
                    Err(err) => return failed(state, err),
                },
                TaskState::ClaimIfZero => {
                    claimed = true;
                    match self.claim(ctx).await {
                        Ok(receipt) => {
                            info!(tx_hash = ?receipt.tx_hash, block_number = receipt.block_number, "Claim confirmed");
                            TaskState::CheckBalance
                        }
                        Err(err) => return failed(state, err),
                    }
                }
                TaskState::Approve => match self.approve_with_retries(ctx).await {
                    Ok(()) => TaskState::Trade,
                    Err(err) => return failed(state, err),
                },
                TaskState::Trade => return self.trade(ctx).await,
            };
        }
    }

    async fn balance(&mut self, ctx: &TaskContext) -> Result<TokenAmount, StepError> {
        let token = ctx.contracts.token;
        let decimals = match self.decimals {
            Some(decimals) => decimals,
            None => {
                let output = self.provider.call(token, contracts::decimals()?).await?;
                let decimals = contracts::decode_decimals(&output)?;
                if decimals > MAX_TOKEN_DECIMALS {
                    return Err(StepError::UnsupportedDecimals(decimals));
                }
                self.decimals = Some(decimals);
                decimals
            }
        };
        let output = self
            .provider
            .call(token, contracts::balance_of(self.address())?)
            .await?;
        let raw = contracts::decode_uint("balanceOf", &output)?;
        Ok(TokenAmount::new(raw, decimals))
    }

    async fn allowance(&self, ctx: &TaskContext) -> Result<U256, StepError> {
        let data = contracts::allowance(self.address(), ctx.contracts.spender)?;
        let output = self.provider.call(ctx.contracts.token, data).await?;
        Ok(contracts::decode_uint("allowance", &output)?)
    }

    async fn estimate(
        &self,
        to: Address,
        data: &Bytes,
        (numerator, denominator): (u64, u64),
    ) -> Result<U256, SubmitterError> {
        let estimate = self.provider.estimate_gas(to, data.clone()).await?;
        Ok(pad_gas_limit(estimate, numerator, denominator))
    }

    /// Submits the call and waits for its receipt. The nonce is advanced only
    /// once a receipt is observed, reverted or not.
    async fn submit(
        &mut self,
        ctx: &TaskContext,
        to: Address,
        data: Bytes,
        gas_limit: U256,
    ) -> Result<Submission, StepError> {
        let nonce = self.nonces.current_nonce().await?;
        let mut call = PendingCall::new(to, data, gas_limit, ctx.fees, nonce, ctx.chain_id);
        let hash = ctx
            .submitter
            .submit(self.provider.as_ref(), &mut self.nonces, &mut call)
            .await?;

        match ctx.waiter.wait(self.provider.as_ref(), hash).await {
            Ok(receipt) => {
                self.nonces.advance_past(call.nonce);
                Ok(Submission::Confirmed(receipt))
            }
            Err(SubmitterError::ReceiptNotFound(hash)) => {
                warn!(?hash, nonce = %call.nonce, "Receipt lost, the transaction may still have landed");
                Ok(Submission::Lost(hash))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn claim(&mut self, ctx: &TaskContext) -> Result<Receipt, StepError> {
        let faucet = ctx.contracts.faucet;
        let data = contracts::claim()?;
        let gas_limit = self.estimate(faucet, &data, CLAIM_GAS_MULTIPLIER).await?;

        match self.submit(ctx, faucet, data, gas_limit).await? {
            Submission::Confirmed(receipt) if receipt.is_success() => Ok(receipt),
            Submission::Confirmed(receipt) => Err(SubmitterError::TxReverted(receipt.tx_hash).into()),
            Submission::Lost(hash) => {
                if let Err(err) = self.nonces.resync().await {
                    warn!(?err, "Failed to resync nonce after losing the claim receipt");
                }
                Err(StepError::Unconfirmed(hash))
            }
        }
    }

    async fn approve_with_retries(&mut self, ctx: &TaskContext) -> Result<(), StepError> {
        let attempts = ctx.policy.approve_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.approve(ctx).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt >= attempts => return Err(err),
                Err(err) => {
                    warn!(attempt, attempts, error = %err, "Approval failed, retrying");
                    sleep(ctx.policy.approve_retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Makes sure the spender holds an unlimited allowance. Cached once
    /// observed.
    async fn approve(&mut self, ctx: &TaskContext) -> Result<(), StepError> {
        let spender = ctx.contracts.spender;
        if self.approved_spenders.contains(&spender) {
            debug!(?spender, "Spender already approved");
            return Ok(());
        }

        let allowance = self.allowance(ctx).await?;
        if allowance >= contracts::unlimited_allowance_threshold() {
            info!(?spender, "Token already approved");
            self.approved_spenders.insert(spender);
            return Ok(());
        }

        info!(?spender, %allowance, "Approving token for trading");
        let token = ctx.contracts.token;
        let data = contracts::approve_unlimited(spender)?;
        let gas_limit = self.estimate(token, &data, APPROVE_GAS_MULTIPLIER).await?;

        match self.submit(ctx, token, data, gas_limit).await? {
            Submission::Confirmed(receipt) if receipt.is_success() => {
                info!(tx_hash = ?receipt.tx_hash, "Approval confirmed");
                self.approved_spenders.insert(spender);
                Ok(())
            }
            Submission::Confirmed(receipt) => Err(SubmitterError::TxReverted(receipt.tx_hash).into()),
            Submission::Lost(hash) => {
                self.nonces.resync().await?;
                if self.allowance(ctx).await? >= contracts::unlimited_allowance_threshold() {
                    info!(?hash, "Approval verified through allowance");
                    self.approved_spenders.insert(spender);
                    Ok(())
                } else {
                    Err(StepError::ApprovalUnconfirmed(hash))
                }
            }
        }
    }

    async fn trade(&mut self, ctx: &TaskContext) -> TaskOutcome {
        let state = TaskState::Trade;
        let balance = match self.balance(ctx).await {
            Ok(balance) => balance,
            Err(err) => return failed(state, err),
        };

        let (size, pair, is_long) = {
            let mut rng = rand::thread_rng();
            (
                trade_size(balance, &mut rng),
                ctx.pairs.choose(&mut rng).cloned(),
                rng.gen_bool(0.5),
            )
        };
        let Some(size) = size else {
            info!(%balance, "Balance too low to trade, skipping");
            return TaskOutcome::Skipped {
                balance: balance.to_string(),
            };
        };
        let Some(pair) = pair else {
            return TaskOutcome::Failed {
                state,
                reason: "no trading pair configured".to_owned(),
            };
        };

        info!(
            %balance,
            size = %TokenAmount::new(size, balance.decimals),
            pair = %pair.name,
            direction = if is_long { "long" } else { "short" },
            "Opening position"
        );

        let attempts = ctx.policy.trade_attempts.max(1);
        let mut attempt = 1;
        loop {
            let err = match self.trade_attempt(ctx, &pair, is_long, size, balance.raw).await {
                Ok(outcome) => return outcome,
                Err(err) => err,
            };
            if attempt >= attempts {
                warn!(attempts, error = %err, "Trade attempts exhausted");
                return failed(state, err);
            }

            let delay = match &err {
                StepError::ProofUnavailable(_) => ctx.policy.missing_proof_delay,
                StepError::ProofStale(_) => ctx.policy.proof_stale_cooldown,
                _ => ctx.policy.trade_retry_delay(attempt),
            };
            warn!(attempt, attempts, error = %err, ?delay, "Trade attempt failed");
            sleep(delay).await;
            attempt += 1;
        }
    }

    async fn trade_attempt(
        &mut self,
        ctx: &TaskContext,
        pair: &TradingPair,
        is_long: bool,
        size: U256,
        balance_before: U256,
    ) -> Result<TaskOutcome, StepError> {
        self.approve(ctx).await?;

        // proofs expire quickly, never reuse one across attempts
        let proof = ctx
            .proofs
            .fetch_proof(pair.index)
            .await
            .map_err(StepError::ProofUnavailable)?;

        let allowance = self.allowance(ctx).await?;
        if allowance < size {
            warn!(%allowance, %size, "Allowance does not cover the trade, approving again");
            self.approved_spenders.remove(&ctx.contracts.spender);
            self.approve(ctx).await?;
        }

        let router = ctx.contracts.router;
        let data = OpenPosition::new(pair.index, proof, is_long, size).encode()?;
        let gas_limit = self
            .estimate(router, &data, TRADE_GAS_MULTIPLIER)
            .await
            .map_err(|err| match err {
                err if err.is_revert() => StepError::ProofStale(err),
                err => err.into(),
            })?;

        match self.submit(ctx, router, data, gas_limit).await? {
            Submission::Confirmed(receipt) if receipt.is_success() => {
                info!(tx_hash = ?receipt.tx_hash, block_number = receipt.block_number, "Trade confirmed");
                Ok(TaskOutcome::Traded {
                    tx_hash: receipt.tx_hash,
                    block_number: Some(receipt.block_number),
                })
            }
            Submission::Confirmed(receipt) => Err(SubmitterError::TxReverted(receipt.tx_hash).into()),
            Submission::Lost(hash) => {
                self.nonces.resync().await?;
                let balance_after = self.balance(ctx).await?;
                if balance_before.saturating_sub(balance_after.raw) >= size {
                    info!(tx_hash = ?hash, balance = %balance_after, "Trade verified through balance");
                    Ok(TaskOutcome::Traded {
                        tx_hash: hash,
                        block_number: None,
                    })
                } else {
                    Err(StepError::TradeUnconfirmed(hash))
                }
            }
        }
    }
}

fn failed(state: TaskState, err: StepError) -> TaskOutcome {
    warn!(%state, error = %err, "Account task failed");
    TaskOutcome::Failed {
        state,
        reason: err.to_string(),
    }
}
