use crate::errors::error::AppError;
use config::{ConfigError, Environment, File};
use ethers_core::types::{Address, U256};
use ethers_signers::{LocalWallet, Signer};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

pub const GWEI: u64 = 1_000_000_000;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub ethereum: EthereumConfig,
    pub relay: RelayConfig,
    pub accounts: AccountsConfig,
    pub splitter: SplitterConfig,
    #[serde(default)]
    pub bundle: BundleConfig,
    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EthereumConfig {
    pub rpc_url: String,
    /// 逗号分隔，可为空（直接使用 rpc_url）
    #[serde(default)]
    pub api_keys: String,
    pub chain_id: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

#[derive(Deserialize, Clone)]
pub struct RelayConfig {
    pub url: String,
    /// 中继信誉私钥（不持有资金）
    pub auth_private_key: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_relay_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Deserialize, Clone)]
pub struct AccountsConfig {
    pub funding_private_key: String,
    pub exploited_private_key: String,
    pub recipient_address: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SplitterConfig {
    pub address: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseSigner {
    Funding,
    Exploited,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PriorityFeeConfig {
    Fixed {
        gwei: u64,
        /// 每次未上链后的 tip 百分比（100 = 不升级，125 = +25%）
        #[serde(default = "default_escalation_percent")]
        escalation_percent: u64,
        #[serde(default)]
        max_gwei: Option<u64>,
    },
    Service {
        url: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_confidence")]
        confidence: u8,
        #[serde(default = "default_true")]
        strict_fee_cap: bool,
    },
}

#[derive(Debug, Deserialize, Clone)]
pub struct BundleConfig {
    #[serde(default = "default_blocks_in_future")]
    pub blocks_in_future: u64,
    #[serde(default = "default_release_signer")]
    pub release_signer: ReleaseSigner,
    /// 固定的注资金额；为空时按 max_fee_per_gas × gas 计算
    #[serde(default)]
    pub funding_endowment_wei: Option<u128>,
    #[serde(default = "default_priority_fee")]
    pub priority_fee: PriorityFeeConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// 循环直到终态
    Loop,
    /// 只做一次完整尝试
    Single,
    /// 只签名并模拟，不提交
    Simulate,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    #[serde(default = "default_run_mode")]
    pub mode: RunMode,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// 0 表示不限次数
    #[serde(default)]
    pub max_attempts: u64,
}

fn default_max_retries() -> usize {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_relay_timeout_ms() -> u64 {
    5_000
}
fn default_escalation_percent() -> u64 {
    125
}
fn default_confidence() -> u8 {
    99
}
fn default_true() -> bool {
    true
}
fn default_blocks_in_future() -> u64 {
    2
}
fn default_release_signer() -> ReleaseSigner {
    ReleaseSigner::Exploited
}
fn default_priority_fee() -> PriorityFeeConfig {
    PriorityFeeConfig::Fixed {
        gwei: 31,
        escalation_percent: default_escalation_percent(),
        max_gwei: Some(default_max_priority_gwei()),
    }
}
fn default_max_priority_gwei() -> u64 {
    500
}
fn default_run_mode() -> RunMode {
    RunMode::Loop
}
fn default_retry_delay_ms() -> u64 {
    1_000
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            blocks_in_future: default_blocks_in_future(),
            release_signer: default_release_signer(),
            funding_endowment_wei: None,
            priority_fee: default_priority_fee(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: default_run_mode(),
            retry_delay_ms: default_retry_delay_ms(),
            max_attempts: 0,
        }
    }
}

// 私钥不进日志
impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("url", &self.url)
            .field("auth_private_key", &"<redacted>")
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl fmt::Debug for AccountsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountsConfig")
            .field("funding_private_key", &"<redacted>")
            .field("exploited_private_key", &"<redacted>")
            .field("recipient_address", &self.recipient_address)
            .finish()
    }
}

impl Config {
    /// 加载顺序：.env → config/default → config/{APP_ENVIRONMENT} → RESCUE__* 环境变量
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let environment = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        config::Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            .add_source(
                Environment::with_prefix("RESCUE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// 启动时一次性校验，失败即为致命配置错误
    pub fn validate(&self) -> Result<(), AppError> {
        if self.bundle.blocks_in_future == 0 {
            return Err(AppError::Validation(
                "bundle.blocks_in_future must be at least 1".into(),
            ));
        }
        match &self.bundle.priority_fee {
            PriorityFeeConfig::Fixed {
                gwei,
                escalation_percent,
                max_gwei,
            } => {
                if *escalation_percent < 100 {
                    return Err(AppError::Validation(format!(
                        "escalation_percent {} would lower the tip",
                        escalation_percent
                    )));
                }
                // 不升级的 tip 只允许有限次数的运行
                if *escalation_percent == 100
                    && self.run.mode == RunMode::Loop
                    && self.run.max_attempts == 0
                {
                    return Err(AppError::Validation(
                        "a flat priority fee (escalation_percent = 100) requires run.max_attempts".into(),
                    ));
                }
                if let Some(max) = max_gwei {
                    if max < gwei {
                        return Err(AppError::Validation(format!(
                            "max_gwei {} is below the starting tip {}",
                            max, gwei
                        )));
                    }
                }
            }
            PriorityFeeConfig::Service {
                url, confidence, ..
            } => {
                url::Url::parse(url).map_err(|e| {
                    AppError::Validation(format!("invalid fee service url {}: {}", url, e))
                })?;
                if !(1..=99).contains(confidence) {
                    return Err(AppError::Validation(format!(
                        "confidence {} must be within 1..=99",
                        confidence
                    )));
                }
            }
        }
        url::Url::parse(&self.relay.url)
            .map_err(|e| AppError::Validation(format!("invalid relay url: {}", e)))?;

        let funding = self.funding_wallet()?.address();
        let exploited = self.exploited_wallet()?.address();
        let recipient = self.recipient_address()?;
        self.auth_wallet()?;
        self.splitter_address()?;

        if funding == exploited || funding == recipient || exploited == recipient {
            return Err(AppError::Validation(
                "funding, exploited and recipient accounts must be distinct".into(),
            ));
        }
        Ok(())
    }

    pub fn auth_wallet(&self) -> Result<LocalWallet, AppError> {
        parse_wallet("auth", &self.relay.auth_private_key, self.ethereum.chain_id)
    }

    pub fn funding_wallet(&self) -> Result<LocalWallet, AppError> {
        parse_wallet(
            "funding",
            &self.accounts.funding_private_key,
            self.ethereum.chain_id,
        )
    }

    pub fn exploited_wallet(&self) -> Result<LocalWallet, AppError> {
        parse_wallet(
            "exploited",
            &self.accounts.exploited_private_key,
            self.ethereum.chain_id,
        )
    }

    pub fn recipient_address(&self) -> Result<Address, AppError> {
        parse_address(&self.accounts.recipient_address)
    }

    pub fn splitter_address(&self) -> Result<Address, AppError> {
        parse_address(&self.splitter.address)
    }

    pub fn funding_endowment(&self) -> Option<U256> {
        self.bundle.funding_endowment_wei.map(U256::from)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.run.retry_delay_ms)
    }
}

fn parse_wallet(role: &'static str, key: &str, chain_id: u64) -> Result<LocalWallet, AppError> {
    key.trim()
        .parse::<LocalWallet>()
        .map(|w| w.with_chain_id(chain_id))
        .map_err(|e| AppError::InvalidKey {
            role,
            reason: e.to_string(),
        })
}

fn parse_address(raw: &str) -> Result<Address, AppError> {
    raw.trim()
        .parse::<Address>()
        .map_err(|_| AppError::InvalidAddress(raw.to_string()))
}
