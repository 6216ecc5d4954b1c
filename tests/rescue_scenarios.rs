use async_trait::async_trait;
use ethers_core::abi::{self, Token};
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, Bytes, H256, TransactionReceipt, U256};
use ethers_core::utils::id;
use ethers_signers::{LocalWallet, Signer};
use splitter_rescue::config::{ReleaseSigner, RunMode};
use splitter_rescue::errors::AppError;
use splitter_rescue::infrastructure::provider::LedgerReader;
use splitter_rescue::infrastructure::relay::{
    BundleTransport, SimulationReport, SubmissionReceipt, resolve_inclusion,
};
use splitter_rescue::models::{BlockHead, BundleAttempt, LegKind, Outcome, SignedBundle};
use splitter_rescue::services::bundle::{BundleComposer, ComposerSettings};
use splitter_rescue::services::payment::PaymentCalculator;
use splitter_rescue::services::payment::splitter_abi;
use splitter_rescue::services::tx::gas::{
    GasService, PriorityFeePolicy, gwei_to_wei, max_base_fee_in_future_block,
};
use splitter_rescue::services::tx::signer::{LocalSigner, TxSigner};
use splitter_rescue::services::{RescueService, RescueSettings};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

const FUNDING_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
const EXPLOITED_KEY: &str = "0x8da4ef21b864d2cc526dbdb2a120bd2874c36c9d0a1fb7f8c63d7f7a8b41de8f";
const CHAIN_ID: u64 = 1;
const RELEASE_GAS: u64 = 60_000;

fn splitter() -> Address {
    Address::repeat_byte(0x5b)
}

fn recipient() -> Address {
    Address::repeat_byte(0xaa)
}

// ==================== 模拟链 ====================

#[derive(Debug, Clone)]
struct SplitterBook {
    balance: U256,
    total_released: U256,
    total_shares: U256,
    shares: U256,
    released: U256,
}

#[derive(Debug)]
struct LedgerState {
    head: BlockHead,
    /// 依次返回，用完后返回 head
    pending_heads: VecDeque<BlockHead>,
    splitter: SplitterBook,
    /// released(account) 依次返回，用完后返回 splitter.released
    released_script: VecDeque<U256>,
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, U256>,
    receipts: HashSet<H256>,
    estimate_calls: usize,
}

struct MockLedger {
    state: Mutex<LedgerState>,
}

impl MockLedger {
    fn new(funding: Address, exploited: Address) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                head: BlockHead::new(100, Some(gwei_to_wei(20))),
                pending_heads: VecDeque::new(),
                // 已释放 1000，exploited 占 25/1000 份额，一分未取
                splitter: SplitterBook {
                    balance: U256::zero(),
                    total_released: U256::from(1000u64),
                    total_shares: U256::from(1000u64),
                    shares: U256::from(25u64),
                    released: U256::zero(),
                },
                released_script: VecDeque::new(),
                balances: HashMap::new(),
                nonces: HashMap::from([(funding, U256::from(3u64)), (exploited, U256::zero())]),
                receipts: HashSet::new(),
                estimate_calls: 0,
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut LedgerState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    fn include(&self, bundle: &SignedBundle) {
        self.with(|s| {
            for leg in &bundle.legs {
                s.receipts.insert(leg.hash);
                s.nonces.insert(leg.from, leg.nonce + 1);
            }
        });
    }
}

fn uint(value: U256) -> Bytes {
    abi::encode(&[Token::Uint(value)]).into()
}

#[async_trait]
impl LedgerReader for MockLedger {
    async fn get_chain_id(&self) -> Result<U256, AppError> {
        Ok(U256::from(CHAIN_ID))
    }

    async fn get_last_block_number(&self) -> Result<u64, AppError> {
        Ok(self.with(|s| s.head.number))
    }

    async fn get_latest_block(&self) -> Result<BlockHead, AppError> {
        Ok(self.with(|s| s.pending_heads.pop_front().unwrap_or(s.head)))
    }

    async fn get_balance(&self, address: Address) -> Result<U256, AppError> {
        Ok(self.with(|s| {
            if address == splitter() {
                s.splitter.balance
            } else {
                s.balances.get(&address).copied().unwrap_or_default()
            }
        }))
    }

    async fn get_transaction_count(&self, address: Address) -> Result<U256, AppError> {
        Ok(self.with(|s| s.nonces.get(&address).copied().unwrap_or_default()))
    }

    async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, AppError> {
        Ok(self.with(|s| {
            s.receipts.contains(&tx_hash).then(|| TransactionReceipt {
                transaction_hash: tx_hash,
                ..Default::default()
            })
        }))
    }

    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, AppError> {
        let data = tx.data().cloned().unwrap_or_default();
        let selector = &data[..4];
        self.with(|s| {
            if selector == &id(splitter_abi::RELEASED)[..] {
                if let Some(released) = s.released_script.pop_front() {
                    return Ok(uint(released));
                }
            }
            let book = &s.splitter;
            if selector == &id(splitter_abi::TOTAL_RELEASED)[..] {
                Ok(uint(book.total_released))
            } else if selector == &id(splitter_abi::TOTAL_SHARES)[..] {
                Ok(uint(book.total_shares))
            } else if selector == &id(splitter_abi::SHARES)[..] {
                Ok(uint(book.shares))
            } else if selector == &id(splitter_abi::RELEASED)[..] {
                Ok(uint(book.released))
            } else {
                Err(AppError::BlockchainError(format!("unexpected call {}", data)))
            }
        })
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, AppError> {
        let data = tx.data().cloned().unwrap_or_default();
        assert_eq!(&data[..4], &id(splitter_abi::RELEASE)[..]);
        self.with(|s| s.estimate_calls += 1);
        Ok(U256::from(RELEASE_GAS))
    }
}

// ==================== 模拟中继 ====================

type WaitHook = Box<dyn FnOnce(&MockLedger, &BundleAttempt) + Send>;

enum WaitStep {
    /// 执行钩子后按链上状态判定
    Resolve(WaitHook),
    Fail(String),
}

#[derive(Default)]
struct TransportLog {
    simulations: Vec<(u64, usize)>,
    submissions: Vec<(Uuid, u64, SignedBundle)>,
}

struct MockTransport {
    ledger: Arc<MockLedger>,
    simulations: Mutex<VecDeque<SimulationReport>>,
    waits: Mutex<VecDeque<WaitStep>>,
    submit_error: Option<String>,
    log: Mutex<TransportLog>,
}

impl MockTransport {
    fn new(ledger: Arc<MockLedger>) -> Self {
        Self {
            ledger,
            simulations: Mutex::new(VecDeque::new()),
            waits: Mutex::new(VecDeque::new()),
            submit_error: None,
            log: Mutex::new(TransportLog::default()),
        }
    }

    fn then_simulate(self, report: SimulationReport) -> Self {
        self.simulations.lock().unwrap().push_back(report);
        self
    }

    fn then_wait(self, step: WaitStep) -> Self {
        self.waits.lock().unwrap().push_back(step);
        self
    }

    fn submitted_tokens(&self) -> Vec<Uuid> {
        self.log.lock().unwrap().submissions.iter().map(|s| s.0).collect()
    }

    fn submitted_targets(&self) -> Vec<u64> {
        self.log.lock().unwrap().submissions.iter().map(|s| s.1).collect()
    }
}

fn passing_report() -> SimulationReport {
    SimulationReport {
        total_gas_used: U256::from(RELEASE_GAS + 42_000),
        coinbase_diff: U256::from(10u64).pow(U256::from(15u64)),
        ..Default::default()
    }
}

fn reverting_report(reason: &str) -> SimulationReport {
    SimulationReport {
        first_revert: Some(reason.to_string()),
        ..Default::default()
    }
}

fn include_bundle() -> WaitStep {
    WaitStep::Resolve(Box::new(|ledger: &MockLedger, attempt: &BundleAttempt| {
        ledger.include(&attempt.bundle)
    }))
}

/// 目标区块出块但 bundle 不在其中
fn miss() -> WaitStep {
    WaitStep::Resolve(Box::new(|ledger: &MockLedger, attempt: &BundleAttempt| {
        ledger.with(|s| s.head.number = attempt.target_block)
    }))
}

#[async_trait]
impl BundleTransport for MockTransport {
    async fn simulate(
        &self,
        bundle: &SignedBundle,
        target_block: u64,
    ) -> Result<SimulationReport, AppError> {
        self.log
            .lock()
            .unwrap()
            .simulations
            .push((target_block, bundle.legs.len()));
        Ok(self
            .simulations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(passing_report))
    }

    async fn submit(&self, attempt: &BundleAttempt) -> Result<SubmissionReceipt, AppError> {
        if let Some(reason) = &self.submit_error {
            return Err(AppError::RelaySubmission(reason.clone()));
        }
        self.log.lock().unwrap().submissions.push((
            attempt.replacement_token,
            attempt.target_block,
            attempt.bundle.clone(),
        ));
        Ok(SubmissionReceipt { bundle_hash: None })
    }

    async fn wait(&self, attempt: &BundleAttempt) -> Result<Outcome, AppError> {
        let step = self.waits.lock().unwrap().pop_front().unwrap_or_else(miss);
        match step {
            WaitStep::Resolve(hook) => {
                hook(&self.ledger, attempt);
                resolve_inclusion(self.ledger.as_ref(), &attempt.bundle).await
            }
            WaitStep::Fail(reason) => Err(AppError::Relay(reason)),
        }
    }
}

// ==================== 组装 ====================

fn signer(role: &'static str, key: &str) -> Arc<dyn TxSigner> {
    let wallet = key.parse::<LocalWallet>().unwrap().with_chain_id(CHAIN_ID);
    Arc::new(LocalSigner::new(role, wallet))
}

fn accounts() -> (Arc<dyn TxSigner>, Arc<dyn TxSigner>) {
    (signer("funding", FUNDING_KEY), signer("exploited", EXPLOITED_KEY))
}

fn fixed_policy(gwei: u64, escalation_percent: u64) -> PriorityFeePolicy {
    PriorityFeePolicy::Fixed {
        base: gwei_to_wei(gwei),
        escalation_percent,
        max: None,
    }
}

fn service(
    ledger: Arc<MockLedger>,
    transport: Arc<MockTransport>,
    mode: RunMode,
    max_attempts: u64,
    policy: PriorityFeePolicy,
) -> RescueService {
    let (funding, exploited) = accounts();
    let composer = BundleComposer::new(
        ComposerSettings {
            chain_id: CHAIN_ID,
            blocks_in_future: 2,
            release_signer: ReleaseSigner::Exploited,
            funding_endowment: None,
        },
        funding,
        exploited,
        recipient(),
        splitter(),
    );
    let calculator = PaymentCalculator::new(ledger.clone(), splitter());
    RescueService::new(
        ledger,
        transport,
        calculator,
        composer,
        GasService::new(policy, None).unwrap(),
        RescueSettings {
            mode,
            retry_delay: Duration::ZERO,
            max_attempts,
        },
    )
}

fn ledger() -> Arc<MockLedger> {
    let (funding, exploited) = accounts();
    Arc::new(MockLedger::new(funding.address(), exploited.address()))
}

// ==================== 场景 ====================

#[tokio::test]
async fn included_bundle_finishes_with_exit_zero() {
    let ledger = ledger();
    let transport = Arc::new(MockTransport::new(ledger.clone()).then_wait(include_bundle()));
    let svc = service(ledger.clone(), transport.clone(), RunMode::Loop, 0, fixed_policy(2, 100));

    let summary = svc.run().await.unwrap();
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.attempts(), 1);
    assert_eq!(summary.last_outcome(), Some(&Outcome::Included));

    let log = transport.log.lock().unwrap();
    let (token, target, bundle) = &log.submissions[0];
    assert_eq!(*target, 102);
    assert_eq!(Some(*token), summary.history[0].replacement_token);

    // 空账户：注资 → release → 转出
    let kinds: Vec<LegKind> = bundle.legs.iter().map(|l| l.kind).collect();
    assert_eq!(kinds, vec![LegKind::FundGas, LegKind::Release, LegKind::Forward]);
    assert_eq!(bundle.legs[2].to, recipient());
    assert_eq!(bundle.legs[2].value, U256::from(25u64));

    let plan = summary.history[0].plan.as_ref().unwrap();
    assert_eq!(plan.amount_owed, U256::from(25u64));
    assert_eq!(plan.gas_limit_for_release, U256::from(RELEASE_GAS));
    assert_eq!(plan.max_priority_fee_per_gas, gwei_to_wei(2));
    assert!(plan.max_fee_per_gas > plan.base_fee);
}

#[tokio::test]
async fn simulation_failure_is_never_submitted() {
    let ledger = ledger();
    let transport = Arc::new(
        MockTransport::new(ledger.clone())
            .then_simulate(reverting_report("0x01: execution reverted"))
            .then_wait(include_bundle()),
    );
    let svc = service(ledger.clone(), transport.clone(), RunMode::Loop, 0, fixed_policy(2, 100));

    let summary = svc.run().await.unwrap();
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.attempts(), 2);
    assert!(matches!(
        &summary.history[0].outcome,
        Some(Outcome::SimulationFailed(reason)) if reason.contains("execution reverted")
    ));

    let log = transport.log.lock().unwrap();
    assert_eq!(log.simulations.len(), 2);
    assert_eq!(log.submissions.len(), 1);
    // 链头未动，目标按链头重新计算
    assert_eq!(log.simulations[0].0, 102);
    assert_eq!(log.simulations[1].0, 102);
    assert_ne!(
        summary.history[0].replacement_token,
        summary.history[1].replacement_token
    );
    // 模拟失败后重新估算 release gas
    assert_eq!(ledger.with(|s| s.estimate_calls), 2);
}

#[tokio::test]
async fn consumed_nonce_ends_the_run_successfully() {
    let ledger = ledger();
    let transport = Arc::new(
        MockTransport::new(ledger.clone()).then_wait(WaitStep::Resolve(Box::new(
            |ledger: &MockLedger, attempt: &BundleAttempt| {
                let exploited = attempt.bundle.legs[1].from;
                ledger.with(|s| s.nonces.insert(exploited, U256::from(5u64)));
            },
        ))),
    );
    let svc = service(ledger, transport.clone(), RunMode::Loop, 0, fixed_policy(2, 100));

    let summary = svc.run().await.unwrap();
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.last_outcome(), Some(&Outcome::AccountNonceTooHigh));
    assert_eq!(transport.submitted_tokens().len(), 1);
}

#[tokio::test]
async fn every_attempt_uses_a_new_token_and_a_later_block() {
    let ledger = ledger();
    let transport = Arc::new(MockTransport::new(ledger.clone()));
    let svc = service(ledger.clone(), transport.clone(), RunMode::Loop, 4, fixed_policy(2, 100));

    let summary = svc.run().await.unwrap();
    assert_eq!(summary.exit_code(), 1);
    assert_eq!(summary.attempts(), 4);
    assert!(
        summary
            .history
            .iter()
            .all(|r| r.outcome == Some(Outcome::BlockPassedNotIncluded))
    );

    let tokens: HashSet<Uuid> = transport.submitted_tokens().into_iter().collect();
    assert_eq!(tokens.len(), 4);
    assert_eq!(transport.submitted_targets(), vec![102, 104, 106, 108]);
    // release gas 只估算一次
    assert_eq!(ledger.with(|s| s.estimate_calls), 1);
}

#[tokio::test]
async fn stalled_head_keeps_the_target_within_the_fee_horizon() {
    let ledger = ledger();
    // 前两轮无可领取金额
    ledger.with(|s| {
        s.released_script
            .extend([U256::from(25u64), U256::from(25u64)])
    });
    let mut transport = MockTransport::new(ledger.clone());
    for _ in 0..4 {
        transport = transport.then_simulate(reverting_report("revert"));
    }
    let transport = Arc::new(transport.then_wait(include_bundle()));
    let svc = service(ledger, transport.clone(), RunMode::Loop, 0, fixed_policy(2, 100));

    let summary = svc.run().await.unwrap();
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.attempts(), 7);
    assert!(summary.history[..2].iter().all(|r| r.error.is_some()));

    let worst_base_fee = max_base_fee_in_future_block(gwei_to_wei(20), 2);
    let plans: Vec<_> = summary.history.iter().filter_map(|r| r.plan.as_ref()).collect();
    assert_eq!(plans.len(), 5);
    for plan in plans {
        assert_eq!(plan.current_block, 100);
        assert_eq!(plan.target_block, 102);
        assert_eq!(
            plan.max_fee_per_gas,
            worst_base_fee + plan.max_priority_fee_per_gas
        );
    }

    let log = transport.log.lock().unwrap();
    assert!(log.simulations.iter().all(|(target, _)| *target == 102));
    assert_eq!(transport_targets(&log), vec![102]);
}

fn transport_targets(log: &TransportLog) -> Vec<u64> {
    log.submissions.iter().map(|s| s.1).collect()
}

#[tokio::test]
async fn misses_escalate_the_fixed_tip() {
    let ledger = ledger();
    let transport = Arc::new(MockTransport::new(ledger.clone()));
    let svc = service(ledger, transport, RunMode::Loop, 3, fixed_policy(2, 150));

    let summary = svc.run().await.unwrap();
    let tips: Vec<U256> = summary
        .history
        .iter()
        .map(|r| r.plan.as_ref().unwrap().max_priority_fee_per_gas)
        .collect();
    assert_eq!(
        tips,
        vec![gwei_to_wei(2), gwei_to_wei(3), U256::from(4_500_000_000u64)]
    );
}

#[tokio::test]
async fn partial_release_between_attempts_shrinks_the_forward() {
    let ledger = ledger();
    let transport = Arc::new(
        MockTransport::new(ledger.clone())
            .then_wait(WaitStep::Resolve(Box::new(|ledger: &MockLedger, _: &BundleAttempt| {
                // 他人代为 release 了 10 wei
                ledger.with(|s| {
                    s.splitter.released += U256::from(10u64);
                    s.splitter.total_released += U256::from(10u64);
                });
            })))
            .then_wait(include_bundle()),
    );
    let svc = service(ledger, transport.clone(), RunMode::Loop, 0, fixed_policy(2, 100));

    let summary = svc.run().await.unwrap();
    assert_eq!(summary.exit_code(), 0);
    let owed: Vec<U256> = summary
        .history
        .iter()
        .map(|r| r.plan.as_ref().unwrap().amount_owed)
        .collect();
    assert_eq!(owed, vec![U256::from(25u64), U256::from(15u64)]);

    let log = transport.log.lock().unwrap();
    let forward = log.submissions[1].2.legs.last().unwrap();
    assert_eq!(forward.kind, LegKind::Forward);
    assert_eq!(forward.value, U256::from(15u64));
}

#[tokio::test]
async fn missing_base_fee_is_retried() {
    let ledger = ledger();
    ledger.with(|s| s.pending_heads.push_back(BlockHead::new(100, None)));
    let transport = Arc::new(MockTransport::new(ledger.clone()).then_wait(include_bundle()));
    let svc = service(ledger, transport.clone(), RunMode::Loop, 0, fixed_policy(2, 100));

    let summary = svc.run().await.unwrap();
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.attempts(), 2);
    assert!(summary.history[0].error.is_some());
    assert!(summary.history[0].plan.is_none());
    assert_eq!(transport.submitted_tokens().len(), 1);
}

#[tokio::test]
async fn relay_rejection_is_fatal() {
    let ledger = ledger();
    let mut transport = MockTransport::new(ledger.clone());
    transport.submit_error = Some("invalid bundle".into());
    let svc = service(ledger, Arc::new(transport), RunMode::Loop, 0, fixed_policy(2, 100));

    let result = svc.run().await;
    assert!(matches!(result, Err(AppError::RelaySubmission(_))));
}

#[tokio::test]
async fn single_shot_miss_exits_one() {
    let ledger = ledger();
    let transport = Arc::new(MockTransport::new(ledger.clone()));
    let svc = service(ledger, transport.clone(), RunMode::Single, 0, fixed_policy(2, 100));

    let summary = svc.run().await.unwrap();
    assert_eq!(summary.exit_code(), 1);
    assert_eq!(summary.attempts(), 1);
    assert_eq!(transport.submitted_tokens().len(), 1);
}

#[tokio::test]
async fn simulate_mode_never_submits() {
    let ledger = ledger();
    let transport = Arc::new(MockTransport::new(ledger.clone()));
    let svc = service(ledger, transport.clone(), RunMode::Simulate, 0, fixed_policy(2, 100));

    let summary = svc.run().await.unwrap();
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.last_outcome(), Some(&Outcome::SimulationPassed));
    assert_eq!(transport.log.lock().unwrap().simulations.len(), 1);
    assert!(transport.submitted_tokens().is_empty());
}

#[tokio::test]
async fn simulate_mode_failure_exits_one() {
    let ledger = ledger();
    let transport =
        Arc::new(MockTransport::new(ledger.clone()).then_simulate(reverting_report("revert")));
    let svc = service(ledger, transport.clone(), RunMode::Simulate, 0, fixed_policy(2, 100));

    let summary = svc.run().await.unwrap();
    assert_eq!(summary.exit_code(), 1);
    assert!(transport.submitted_tokens().is_empty());
}

#[tokio::test]
async fn nothing_owed_never_reaches_the_relay() {
    let ledger = ledger();
    ledger.with(|s| s.splitter.released = U256::from(25u64));
    let transport = Arc::new(MockTransport::new(ledger.clone()));
    let svc = service(ledger, transport.clone(), RunMode::Loop, 2, fixed_policy(2, 100));

    let summary = svc.run().await.unwrap();
    assert_eq!(summary.exit_code(), 1);
    assert!(summary.history.iter().all(|r| r.error.is_some()));
    assert!(transport.log.lock().unwrap().simulations.is_empty());
}

#[tokio::test]
async fn funded_exploited_account_gets_a_two_leg_bundle() {
    let ledger = ledger();
    let (_, exploited) = accounts();
    ledger.with(|s| {
        s.balances
            .insert(exploited.address(), U256::from(10u64).pow(U256::from(18u64)))
    });
    let transport = Arc::new(MockTransport::new(ledger.clone()).then_wait(include_bundle()));
    let svc = service(ledger, transport.clone(), RunMode::Loop, 0, fixed_policy(2, 100));

    let summary = svc.run().await.unwrap();
    assert_eq!(summary.exit_code(), 0);
    let log = transport.log.lock().unwrap();
    let kinds: Vec<LegKind> = log.submissions[0].2.legs.iter().map(|l| l.kind).collect();
    assert_eq!(kinds, vec![LegKind::Release, LegKind::Forward]);
}

#[tokio::test]
async fn lost_inclusion_check_counts_as_a_miss() {
    let ledger = ledger();
    let transport = Arc::new(
        MockTransport::new(ledger.clone())
            .then_wait(WaitStep::Fail("connection reset".into()))
            .then_wait(include_bundle()),
    );
    let svc = service(ledger, transport.clone(), RunMode::Loop, 0, fixed_policy(2, 200));

    let summary = svc.run().await.unwrap();
    assert_eq!(summary.exit_code(), 0);
    assert!(matches!(summary.history[0].outcome, Some(Outcome::Unknown(_))));
    let second_tip = summary.history[1].plan.as_ref().unwrap().max_priority_fee_per_gas;
    assert_eq!(second_tip, gwei_to_wei(4));
}
