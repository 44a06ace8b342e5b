use std::{fmt, sync::Arc, time::Duration};

use ethers::providers::{Http, Provider};
use eyre::{Context, Result};
use itertools::Itertools;
use submitter::{EthersLedgerProvider, LedgerProvider, ReceiptWaiter, TransactionSubmitter};
use tokio::time::sleep;
use tracing::{info, info_span, warn, Instrument};

use crate::{
    account::{Account, TaskContext, TaskOutcome, TaskPolicy},
    proof::ProofClient,
    scheduler::{SlotOutcome, WorkerPool},
    settings::TraderSettings,
    wallets::load_wallets,
};

/// Counts of account outcomes in one round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoundSummary {
    pub traded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl RoundSummary {
    pub fn from_outcomes(outcomes: &[(usize, SlotOutcome<TaskOutcome>)]) -> Self {
        let counts = outcomes
            .iter()
            .map(|(_, outcome)| match outcome {
                SlotOutcome::Finished(TaskOutcome::Traded { .. }) => "traded",
                SlotOutcome::Finished(TaskOutcome::Skipped { .. }) => "skipped",
                SlotOutcome::Finished(TaskOutcome::Failed { .. }) | SlotOutcome::Panicked(_) => {
                    "failed"
                }
                SlotOutcome::TimedOut => "timed_out",
            })
            .counts();
        let count = |kind: &str| counts.get(kind).copied().unwrap_or_default();
        Self {
            traded: count("traded"),
            skipped: count("skipped"),
            failed: count("failed"),
            timed_out: count("timed_out"),
        }
    }
}

impl fmt::Display for RoundSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} traded, {} skipped, {} failed, {} timed out",
            self.traded, self.skipped, self.failed, self.timed_out
        )
    }
}

/// Runs the account list through the worker pool for the configured number
/// of rounds.
#[derive(Debug)]
pub struct Trader {
    accounts: Vec<Arc<dyn LedgerProvider>>,
    ctx: Arc<TaskContext>,
    pool: WorkerPool,
    rounds: u32,
    round_cooldown: Duration,
}

impl Trader {
    pub fn new(
        accounts: Vec<Arc<dyn LedgerProvider>>,
        ctx: TaskContext,
        pool: WorkerPool,
        rounds: u32,
        round_cooldown: Duration,
    ) -> Self {
        Self {
            accounts,
            ctx: Arc::new(ctx),
            pool,
            rounds,
            round_cooldown,
        }
    }

    pub fn from_settings(settings: &TraderSettings) -> Result<Self> {
        let wallets = load_wallets(&settings.wallet_file)?;
        info!(wallets = wallets.len(), path = ?settings.wallet_file, "Loaded wallets");

        let provider = Provider::<Http>::try_from(settings.rpc_url.as_str())
            .wrap_err("Failed to build rpc provider")?;
        let accounts = wallets
            .into_iter()
            .map(|wallet| {
                Arc::new(EthersLedgerProvider::new(
                    provider.clone(),
                    wallet,
                    settings.chain_id,
                )) as Arc<dyn LedgerProvider>
            })
            .collect();

        let ctx = TaskContext {
            contracts: settings.contracts.clone(),
            pairs: settings.pairs.clone(),
            fees: settings.fees.baseline(),
            chain_id: settings.chain_id,
            proofs: Arc::new(ProofClient::new(&settings.proof_api_url)?),
            submitter: TransactionSubmitter::default(),
            waiter: ReceiptWaiter::default(),
            policy: TaskPolicy::default(),
        };
        let pool = WorkerPool::new(settings.max_concurrency, settings.task_timeout);

        Ok(Self::new(
            accounts,
            ctx,
            pool,
            settings.rounds,
            settings.round_cooldown,
        ))
    }

    pub async fn run(&self) -> Vec<RoundSummary> {
        let mut summaries = Vec::with_capacity(self.rounds as usize);
        for round in 1..=self.rounds {
            let summary = self.run_round(round).await;
            info!(round, rounds = self.rounds, %summary, "Round complete");
            summaries.push(summary);
            if round < self.rounds {
                sleep(self.round_cooldown).await;
            }
        }
        info!(rounds = self.rounds, "All rounds complete");
        summaries
    }

    async fn run_round(&self, round: u32) -> RoundSummary {
        info!(round, accounts = self.accounts.len(), "Starting round");
        let outcomes = self
            .pool
            .run_round(self.accounts.iter().cloned(), |index, provider| {
                let ctx = self.ctx.clone();
                let span = info_span!("account", round, index, address = ?provider.address());
                // fresh per-round state, the nonce is reseeded from the node
                let account = Account::new(index, provider);
                async move { account.run(&ctx).await }.instrument(span)
            })
            .await;

        for (index, outcome) in &outcomes {
            match outcome {
                SlotOutcome::Finished(TaskOutcome::Traded {
                    tx_hash,
                    block_number,
                }) => info!(round, index, ?tx_hash, ?block_number, "Account traded"),
                SlotOutcome::Finished(TaskOutcome::Skipped { balance }) => {
                    info!(round, index, %balance, "Account skipped")
                }
                SlotOutcome::Finished(TaskOutcome::Failed { state, reason }) => {
                    warn!(round, index, %state, %reason, "Account failed")
                }
                SlotOutcome::TimedOut => warn!(round, index, "Account timed out"),
                SlotOutcome::Panicked(message) => {
                    warn!(round, index, %message, "Account task panicked")
                }
            }
        }
        RoundSummary::from_outcomes(&outcomes)
    }
}
