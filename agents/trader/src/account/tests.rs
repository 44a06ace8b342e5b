use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use ethers::{
    abi::{self, Token},
    types::{Address, Bytes, H256, U256},
};
use submitter::{
    test_utils::{dummy_receipt, MockLedgerProvider},
    FeeCaps, ReceiptWaiter, SubmitterError, TransactionSubmitter,
};
use tokio::time::Instant;

use crate::{
    contracts,
    proof::test_utils::MockProofSource,
    settings::{ContractAddresses, TradingPair},
};

use super::{Account, TaskContext, TaskOutcome, TaskPolicy, TaskState};

const DECIMALS: u8 = 6;

fn tokens(whole: u64) -> U256 {
    U256::from(whole) * U256::exp10(DECIMALS.into())
}

fn account_address() -> Address {
    Address::from_low_u64_be(0xacc0)
}

/// Scripted view of the ledger for one account.
#[derive(Default)]
struct LedgerState {
    /// Successive `balanceOf` results, the last one repeats.
    balances: VecDeque<U256>,
    /// Successive `allowance` results, the last one repeats.
    allowances: VecDeque<U256>,
    /// Successive router gas estimates, then `Ok` forever.
    trade_estimates: VecDeque<Result<U256, SubmitterError>>,
    trade_estimates_always_fail: bool,
    balance_unreadable: bool,
    claim_reverts: bool,
    approve_estimate_fails: bool,
    lose_receipts: bool,
    balance_reads: usize,
    sent: Vec<Address>,
}

fn next(queue: &mut VecDeque<U256>) -> U256 {
    if queue.len() > 1 {
        queue.pop_front().unwrap_or_default()
    } else {
        queue.front().copied().unwrap_or_default()
    }
}

fn encode_uint(value: U256) -> Bytes {
    Bytes::from(abi::encode(&[Token::Uint(value)]))
}

fn mock_ledger(state: Arc<Mutex<LedgerState>>) -> MockLedgerProvider {
    let addresses = ContractAddresses::default();
    let mut provider = MockLedgerProvider::new();
    provider.expect_address().return_const(account_address());
    provider
        .expect_pending_nonce()
        .returning(|| Ok(U256::from(7)));

    let balance_selector = contracts::balance_of(account_address()).unwrap()[..4].to_vec();
    let decimals_selector = contracts::decimals().unwrap().to_vec();
    let s = state.clone();
    provider.expect_call().returning(move |_, data| {
        let mut s = s.lock().unwrap();
        let selector = &data[..4];
        if selector == decimals_selector.as_slice() {
            Ok(encode_uint(U256::from(DECIMALS)))
        } else if selector == balance_selector.as_slice() {
            s.balance_reads += 1;
            if s.balance_unreadable {
                return Err(SubmitterError::NetworkError("connection refused".into()));
            }
            Ok(encode_uint(next(&mut s.balances)))
        } else {
            Ok(encode_uint(next(&mut s.allowances)))
        }
    });

    let s = state.clone();
    provider.expect_estimate_gas().returning(move |to, _| {
        let mut s = s.lock().unwrap();
        if to == addresses.router {
            if s.trade_estimates_always_fail {
                return Err(SubmitterError::NetworkError("gateway timeout".into()));
            }
            s.trade_estimates
                .pop_front()
                .unwrap_or(Ok(U256::from(250_000)))
        } else if to == addresses.faucet && s.claim_reverts {
            Err(SubmitterError::Reverted("execution reverted: already claimed".into()))
        } else if to == addresses.token && s.approve_estimate_fails {
            Err(SubmitterError::NetworkError("502 bad gateway".into()))
        } else {
            Ok(U256::from(60_000))
        }
    });

    let s = state.clone();
    provider.expect_send().returning(move |call| {
        let mut s = s.lock().unwrap();
        s.sent.push(call.to);
        Ok(H256::from_low_u64_be(s.sent.len() as u64))
    });

    let s = state.clone();
    provider
        .expect_wait_for_inclusion()
        .returning(move |hash, _, _| {
            if s.lock().unwrap().lose_receipts {
                Err(SubmitterError::ConfirmationTimeout(hash))
            } else {
                Ok(dummy_receipt(hash, 100))
            }
        });
    provider.expect_transaction_exists().returning(|_| Ok(false));
    provider
        .expect_get_transaction_receipt()
        .returning(|_| Ok(None));
    provider.expect_get_block_number().returning(|| Ok(100));
    provider
}

fn proofs_ok() -> (MockProofSource, Arc<Mutex<usize>>) {
    proofs_failing_first(0)
}

fn proofs_failing_first(failures: usize) -> (MockProofSource, Arc<Mutex<usize>>) {
    let fetched = Arc::new(Mutex::new(0));
    let counter = fetched.clone();
    let mut proofs = MockProofSource::new();
    proofs.expect_fetch_proof().returning(move |pair_index| {
        assert_eq!(pair_index, 6004);
        let mut fetched = counter.lock().unwrap();
        *fetched += 1;
        if *fetched <= failures {
            Err(eyre::eyre!("Proof service returned no proof for pair 6004"))
        } else {
            Ok(Bytes::from(vec![0xab; 32]))
        }
    });
    (proofs, fetched)
}

fn context(proofs: MockProofSource, policy: TaskPolicy) -> TaskContext {
    TaskContext {
        contracts: ContractAddresses::default(),
        pairs: vec![TradingPair::default()],
        fees: FeeCaps::from_gwei(5, 2),
        chain_id: 688688,
        proofs: Arc::new(proofs),
        submitter: TransactionSubmitter::default(),
        waiter: ReceiptWaiter::default(),
        policy,
    }
}

fn run_account(state: &Arc<Mutex<LedgerState>>) -> Account {
    Account::new(0, Arc::new(mock_ledger(state.clone())))
}

fn ledger(state: LedgerState) -> Arc<Mutex<LedgerState>> {
    Arc::new(Mutex::new(state))
}

#[tokio::test(start_paused = true)]
async fn zero_balance_claims_once_then_rereads_before_trading() {
    let state = ledger(LedgerState {
        balances: [U256::zero(), tokens(20)].into(),
        allowances: [U256::MAX].into(),
        ..Default::default()
    });
    let (proofs, _) = proofs_ok();
    let ctx = context(proofs, TaskPolicy::default());

    let outcome = run_account(&state).run(&ctx).await;

    assert_eq!(
        outcome,
        TaskOutcome::Traded {
            tx_hash: H256::from_low_u64_be(2),
            block_number: Some(100),
        }
    );
    let state = state.lock().unwrap();
    let addresses = ContractAddresses::default();
    assert_eq!(state.sent, vec![addresses.faucet, addresses.router]);
    // initial read, post claim read, pre trade read
    assert_eq!(state.balance_reads, 3);
}

#[tokio::test(start_paused = true)]
async fn claim_is_attempted_only_once() {
    let state = ledger(LedgerState {
        balances: [U256::zero()].into(),
        allowances: [U256::MAX].into(),
        ..Default::default()
    });
    let (proofs, fetched) = proofs_ok();
    let ctx = context(proofs, TaskPolicy::default());

    let outcome = run_account(&state).run(&ctx).await;

    assert!(matches!(outcome, TaskOutcome::Skipped { .. }));
    assert_eq!(state.lock().unwrap().sent, vec![ContractAddresses::default().faucet]);
    assert_eq!(*fetched.lock().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn unreadable_balance_fails_the_task() {
    let state = ledger(LedgerState {
        balance_unreadable: true,
        ..Default::default()
    });
    let (proofs, _) = proofs_ok();
    let ctx = context(proofs, TaskPolicy::default());

    let outcome = run_account(&state).run(&ctx).await;

    assert!(matches!(
        outcome,
        TaskOutcome::Failed {
            state: TaskState::CheckBalance,
            ..
        }
    ));
    assert!(state.lock().unwrap().sent.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_claim_is_terminal() {
    let state = ledger(LedgerState {
        balances: [U256::zero()].into(),
        claim_reverts: true,
        ..Default::default()
    });
    let (proofs, _) = proofs_ok();
    let ctx = context(proofs, TaskPolicy::default());

    let outcome = run_account(&state).run(&ctx).await;

    assert!(matches!(
        outcome,
        TaskOutcome::Failed {
            state: TaskState::ClaimIfZero,
            ..
        }
    ));
    assert!(state.lock().unwrap().sent.is_empty());
}

#[tokio::test(start_paused = true)]
async fn dust_balance_is_a_skip_not_a_failure() {
    let state = ledger(LedgerState {
        balances: [U256::from(500_000)].into(),
        allowances: [U256::MAX].into(),
        ..Default::default()
    });
    let (proofs, _) = proofs_ok();
    let ctx = context(proofs, TaskPolicy::default());

    let outcome = run_account(&state).run(&ctx).await;

    assert_eq!(
        outcome,
        TaskOutcome::Skipped {
            balance: "0.500000".to_owned()
        }
    );
    assert!(!outcome.is_success());
    assert!(state.lock().unwrap().sent.is_empty());
}

#[tokio::test(start_paused = true)]
async fn approval_gives_up_after_five_attempts() {
    let state = ledger(LedgerState {
        balances: [tokens(20)].into(),
        allowances: [U256::zero()].into(),
        approve_estimate_fails: true,
        ..Default::default()
    });
    let (proofs, _) = proofs_ok();
    let ctx = context(proofs, TaskPolicy::default());
    let started = Instant::now();

    let outcome = run_account(&state).run(&ctx).await;

    assert!(matches!(
        outcome,
        TaskOutcome::Failed {
            state: TaskState::Approve,
            ..
        }
    ));
    assert_eq!(Instant::now() - started, Duration::from_secs(4 * 3));
    assert!(state.lock().unwrap().sent.is_empty());
}

#[tokio::test(start_paused = true)]
async fn stale_proof_is_refetched_after_cooldown() {
    let state = ledger(LedgerState {
        balances: [tokens(20)].into(),
        allowances: [U256::MAX].into(),
        trade_estimates: [Err(SubmitterError::Reverted(
            "execution reverted: unknown custom error".into(),
        ))]
        .into(),
        ..Default::default()
    });
    let (proofs, fetched) = proofs_ok();
    let ctx = context(proofs, TaskPolicy::default());
    let started = Instant::now();

    let outcome = run_account(&state).run(&ctx).await;

    assert!(outcome.is_success());
    assert_eq!(*fetched.lock().unwrap(), 2);
    assert_eq!(Instant::now() - started, Duration::from_secs(5));
    assert_eq!(state.lock().unwrap().sent, vec![ContractAddresses::default().router]);
}

#[tokio::test(start_paused = true)]
async fn missing_proof_waits_and_retries() {
    let state = ledger(LedgerState {
        balances: [tokens(3)].into(),
        allowances: [U256::MAX].into(),
        ..Default::default()
    });
    let (proofs, fetched) = proofs_failing_first(2);
    let ctx = context(proofs, TaskPolicy::default());
    let started = Instant::now();

    let outcome = run_account(&state).run(&ctx).await;

    assert!(outcome.is_success());
    assert_eq!(*fetched.lock().unwrap(), 3);
    assert_eq!(Instant::now() - started, Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn insufficient_allowance_invalidates_cached_approval() {
    let state = ledger(LedgerState {
        balances: [tokens(20)].into(),
        // approve state, trade check, re-verification, then unlimited
        allowances: [U256::MAX, U256::zero(), U256::zero(), U256::MAX].into(),
        ..Default::default()
    });
    let (proofs, _) = proofs_ok();
    let ctx = context(proofs, TaskPolicy::default());

    let outcome = run_account(&state).run(&ctx).await;

    assert!(outcome.is_success());
    let addresses = ContractAddresses::default();
    assert_eq!(
        state.lock().unwrap().sent,
        vec![addresses.token, addresses.router]
    );
}

#[tokio::test(start_paused = true)]
async fn lost_trade_receipt_is_confirmed_by_balance_drop() {
    let state = ledger(LedgerState {
        // check, pre trade, after the lost receipt
        balances: [tokens(20), tokens(20), tokens(5)].into(),
        allowances: [U256::MAX].into(),
        lose_receipts: true,
        ..Default::default()
    });
    let (proofs, _) = proofs_ok();
    let ctx = context(proofs, TaskPolicy::default());

    let outcome = run_account(&state).run(&ctx).await;

    assert_eq!(
        outcome,
        TaskOutcome::Traded {
            tx_hash: H256::from_low_u64_be(1),
            block_number: None,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn lost_trade_receipt_without_balance_drop_is_retried() {
    let state = ledger(LedgerState {
        balances: [tokens(20)].into(),
        allowances: [U256::MAX].into(),
        lose_receipts: true,
        ..Default::default()
    });
    let (proofs, _) = proofs_ok();
    let policy = TaskPolicy {
        trade_attempts: 2,
        ..Default::default()
    };
    let ctx = context(proofs, policy);

    let outcome = run_account(&state).run(&ctx).await;

    assert!(matches!(
        outcome,
        TaskOutcome::Failed {
            state: TaskState::Trade,
            ..
        }
    ));
    let router = ContractAddresses::default().router;
    assert_eq!(state.lock().unwrap().sent, vec![router, router]);
}

#[tokio::test(start_paused = true)]
async fn trade_exhaustion_fails_the_task() {
    let state = ledger(LedgerState {
        balances: [tokens(20)].into(),
        allowances: [U256::MAX].into(),
        trade_estimates_always_fail: true,
        ..Default::default()
    });
    let (proofs, fetched) = proofs_ok();
    let policy = TaskPolicy {
        trade_attempts: 3,
        ..Default::default()
    };
    let ctx = context(proofs, policy);
    let started = Instant::now();

    let outcome = run_account(&state).run(&ctx).await;

    assert!(matches!(
        outcome,
        TaskOutcome::Failed {
            state: TaskState::Trade,
            ..
        }
    ));
    assert_eq!(*fetched.lock().unwrap(), 3);
    // 7s after the first attempt, 9s after the second, none after the last
    assert_eq!(Instant::now() - started, Duration::from_secs(16));
}

#[test]
fn trade_retry_delay_grows_to_cap() {
    let policy = TaskPolicy::default();
    let delays = (1..=6)
        .map(|attempt| policy.trade_retry_delay(attempt).as_secs())
        .collect::<Vec<_>>();

    assert_eq!(delays, vec![7, 9, 11, 13, 15, 15]);
}
