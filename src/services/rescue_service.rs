// services/rescue_service.rs
use crate::config::RunMode;
use crate::errors::error::AppError;
use crate::infrastructure::provider::LedgerReader;
use crate::infrastructure::relay::BundleTransport;
use crate::models::{BundleAttempt, LoopDecision, Outcome, RescuePlan};
use crate::services::bundle::BundleComposer;
use crate::services::payment::PaymentCalculator;
use crate::services::tx::gas::GasService;
use crate::services::tx::nonce::NonceBook;
use crate::services::tx::simulation::{SimulationService, SimulationVerdict};
use crate::{log_debug, log_error, log_info, log_warn};
use ethers_core::types::U256;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RescueSettings {
    pub mode: RunMode,
    /// 临时性失败（RPC、估算、计划无效）后的等待
    pub retry_delay: Duration,
    /// 0 表示不限
    pub max_attempts: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    ComputingPlan,
    Composing,
    Simulating,
    Submitting,
    AwaitingInclusion,
}

impl fmt::Display for AttemptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 每轮尝试的日志记录
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptRecord {
    pub attempt: u64,
    pub plan: Option<RescuePlan>,
    pub replacement_token: Option<Uuid>,
    pub outcome: Option<Outcome>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub success: bool,
    pub history: Vec<AttemptRecord>,
}

impl RunSummary {
    pub fn attempts(&self) -> usize {
        self.history.len()
    }

    pub fn last_outcome(&self) -> Option<&Outcome> {
        self.history.last().and_then(|r| r.outcome.as_ref())
    }

    pub fn exit_code(&self) -> u8 {
        if self.success { 0 } else { 1 }
    }
}

/// 跨轮只保留尝试计数、连续未上链次数、已发出的令牌和 release gas 缓存
#[derive(Debug, Default)]
struct LoopState {
    attempts: u64,
    misses: u32,
    release_gas: Option<U256>,
    issued_tokens: HashSet<Uuid>,
}

impl LoopState {
    fn fresh_token(&mut self) -> Uuid {
        loop {
            let token = Uuid::new_v4();
            if self.issued_tokens.insert(token) {
                return token;
            }
        }
    }
}

pub struct RescueService {
    ledger: Arc<dyn LedgerReader>,
    transport: Arc<dyn BundleTransport>,
    simulation: SimulationService,
    calculator: PaymentCalculator,
    composer: BundleComposer,
    gas: GasService,
    settings: RescueSettings,
}

impl RescueService {
    pub fn new(
        ledger: Arc<dyn LedgerReader>,
        transport: Arc<dyn BundleTransport>,
        calculator: PaymentCalculator,
        composer: BundleComposer,
        gas: GasService,
        settings: RescueSettings,
    ) -> Self {
        Self {
            simulation: SimulationService::new(transport.clone()),
            ledger,
            transport,
            calculator,
            composer,
            gas,
            settings,
        }
    }

    /// 循环直到终态。提交被中继拒绝时返回 Err（致命）。
    pub async fn run(&self) -> Result<RunSummary, AppError> {
        let mut state = LoopState::default();
        let mut history = Vec::new();

        loop {
            state.attempts += 1;
            let mut record = AttemptRecord {
                attempt: state.attempts,
                ..Default::default()
            };
            log_info!("===== 第 {} 轮救援尝试 =====", state.attempts);

            let result = self.attempt(&mut state, &mut record).await;
            let decision = match result {
                Ok(outcome) => {
                    log_info!("第 {} 轮结果: {}", state.attempts, outcome);
                    if outcome.is_miss() {
                        state.misses = state.misses.saturating_add(1);
                    }
                    if matches!(outcome, Outcome::SimulationFailed(_)) {
                        // 链上状态已变，下一轮重新估算 release gas
                        state.release_gas = None;
                    }
                    let decision = outcome.decision();
                    record.outcome = Some(outcome);
                    decision
                }
                Err(e) if e.is_transient() => {
                    log_warn!("第 {} 轮中止（可重试）: {}", state.attempts, e);
                    record.error = Some(e.to_string());
                    LoopDecision::Retry
                }
                Err(e) => {
                    log_error!("第 {} 轮出现致命错误: {}", state.attempts, e);
                    return Err(e);
                }
            };
            let transient_failure = record.error.is_some();
            history.push(record);

            match decision {
                LoopDecision::Finish => {
                    log_info!("✅ 救援结束，共 {} 轮", state.attempts);
                    return Ok(RunSummary {
                        success: true,
                        history,
                    });
                }
                LoopDecision::Abort => {
                    let reason = history
                        .last()
                        .and_then(|r| r.outcome.as_ref())
                        .map(|o| o.to_string())
                        .unwrap_or_default();
                    log_error!("❌ 中继拒绝提交，停止: {}", reason);
                    return Err(AppError::RelaySubmission(reason));
                }
                LoopDecision::Retry => {}
            }

            if self.settings.mode != RunMode::Loop {
                return Ok(RunSummary {
                    success: false,
                    history,
                });
            }
            if self.settings.max_attempts > 0 && state.attempts >= self.settings.max_attempts {
                log_warn!("已达到最大尝试次数 {}", self.settings.max_attempts);
                return Ok(RunSummary {
                    success: false,
                    history,
                });
            }
            if transient_failure && !self.settings.retry_delay.is_zero() {
                tokio::time::sleep(self.settings.retry_delay).await;
            }
        }
    }

    fn enter(&self, attempt: u64, phase: AttemptPhase) {
        log_debug!("attempt #{} → {}", attempt, phase);
    }

    async fn compute_plan(&self, state: &mut LoopState) -> Result<RescuePlan, AppError> {
        let head = self.ledger.get_latest_block().await?;
        let base_fee = head
            .base_fee_per_gas
            .ok_or(AppError::MissingBaseFee(head.number))?;
        let target_block = self.composer.target_block(head.number);

        let amount_owed = self
            .calculator
            .amount_owed(self.composer.exploited_address())
            .await?;
        if amount_owed.is_zero() {
            return Err(AppError::InvalidPlan("nothing owed yet".into()));
        }

        // fee 推算到目标区块为止
        let fees = self
            .gas
            .resolve_fees(base_fee, target_block - head.number, state.misses)
            .await?;

        let gas_limit_for_release = match state.release_gas {
            Some(gas) => gas,
            None => {
                let gas = self.composer.estimate_release_gas(self.ledger.as_ref()).await?;
                log_info!("release() gas 估算: {}", gas);
                state.release_gas = Some(gas);
                gas
            }
        };

        Ok(RescuePlan {
            current_block: head.number,
            target_block,
            base_fee,
            amount_owed,
            gas_limit_for_release,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
        })
    }

    async fn attempt(
        &self,
        state: &mut LoopState,
        record: &mut AttemptRecord,
    ) -> Result<Outcome, AppError> {
        let n = state.attempts;

        self.enter(n, AttemptPhase::ComputingPlan);
        let plan = self.compute_plan(state).await?;
        log_info!("救援计划: {}", plan);
        record.plan = Some(plan.clone());

        self.enter(n, AttemptPhase::Composing);
        let exploited = self.composer.exploited_address();
        let balance = self.ledger.get_balance(exploited).await?;
        let mut nonces = NonceBook::load(
            self.ledger.as_ref(),
            &[self.composer.funding_address(), exploited],
        )
        .await?;
        let set = self.composer.compose(&plan, balance, &mut nonces)?;
        let bundle = self.composer.sign(&set).await?;

        let token = state.fresh_token();
        record.replacement_token = Some(token);
        let attempt = BundleAttempt {
            attempt: n,
            bundle,
            replacement_token: token,
            target_block: plan.target_block,
        };

        self.enter(n, AttemptPhase::Simulating);
        match self.simulation.run(&attempt.bundle, attempt.target_block).await? {
            SimulationVerdict::Failed(reason) => return Ok(Outcome::SimulationFailed(reason)),
            SimulationVerdict::Passed(_) => {}
        }
        if self.settings.mode == RunMode::Simulate {
            return Ok(Outcome::SimulationPassed);
        }

        self.enter(n, AttemptPhase::Submitting);
        if let Err(e) = self.transport.submit(&attempt).await {
            return Ok(Outcome::RelaySubmissionFailed(e.to_string()));
        }

        self.enter(n, AttemptPhase::AwaitingInclusion);
        match self.transport.wait(&attempt).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Ok(Outcome::Unknown(e.to_string())),
        }
    }
}
