use std::sync::Arc;
use std::time::Duration;

use ethers_core::types::U256;

use crate::config::{Config, PriorityFeeConfig};
use crate::errors::error::AppError;
use crate::infrastructure::provider::ethereum_provider::EthereumProvider;
use crate::infrastructure::provider::{LedgerReader, RetryAdapter};
use crate::infrastructure::relay::{BlockPriceOracle, BundleTransport, FeeOracle, FlashbotsRelay};
use crate::services::bundle::{BundleComposer, ComposerSettings};
use crate::services::payment::PaymentCalculator;
use crate::services::rescue_service::{RescueService, RescueSettings, RunSummary};
use crate::services::tx::gas::{GasService, PriorityFeePolicy};
use crate::services::tx::signer::{LocalSigner, TxSigner};
use crate::utils::to_ether;
use crate::{log_info, log_warn};

/// 应用程序启动与管理结构体（一次性救援任务，无HTTP API）
pub struct Application {
    pub rescue_service: Arc<RescueService>,
}
pub type Result<T> = std::result::Result<T, AppError>;

impl Application {
    /// 构建应用实例：校验配置、连接节点、组装各服务（不发送任何交易）
    pub async fn build(config: Config) -> Result<Self> {
        config.validate()?;
        log_info!("Configuration validated: {:?}", config.run);

        // 1. 先初始化 Provider
        let eth_provider = Arc::new(EthereumProvider::new(&config.ethereum)?);
        let ledger = Arc::new(RetryAdapter::new(
            eth_provider,
            config.ethereum.max_retries,
            Duration::from_millis(config.ethereum.base_delay_ms),
        )) as Arc<dyn LedgerReader>;

        let remote_chain_id = ledger.get_chain_id().await?;
        if remote_chain_id != U256::from(config.ethereum.chain_id) {
            return Err(AppError::Validation(format!(
                "rpc chain id {} does not match configured chain id {}",
                remote_chain_id, config.ethereum.chain_id
            )));
        }

        // 2. 账户（只打印地址）
        let funding = Arc::new(LocalSigner::new("funding", config.funding_wallet()?)) as Arc<dyn TxSigner>;
        let exploited = Arc::new(LocalSigner::new("exploited", config.exploited_wallet()?)) as Arc<dyn TxSigner>;
        let recipient = config.recipient_address()?;
        let splitter = config.splitter_address()?;
        log_info!("Funding account:   {:?}", funding.address());
        log_info!("Exploited account: {:?}", exploited.address());
        log_info!("Recipient:         {:?}", recipient);
        log_info!("Splitter:          {:?}", splitter);

        let funding_balance = ledger.get_balance(funding.address()).await?;
        log_info!("Funding balance: {} ETH", to_ether(funding_balance));
        if funding_balance.is_zero() {
            log_warn!("Funding account is empty, bundles that need a gas top-up will fail simulation");
        }

        // 3. 中继与费用
        let transport = Arc::new(FlashbotsRelay::new(
            &config.relay,
            config.auth_wallet()?,
            ledger.clone(),
        )?) as Arc<dyn BundleTransport>;

        let oracle = match &config.bundle.priority_fee {
            PriorityFeeConfig::Service {
                url,
                api_key,
                confidence,
                ..
            } => Some(Arc::new(BlockPriceOracle::new(
                url.clone(),
                api_key.clone(),
                *confidence,
                Duration::from_millis(config.relay.timeout_ms),
            )?) as Arc<dyn FeeOracle>),
            PriorityFeeConfig::Fixed { .. } => None,
        };
        let gas = GasService::new(PriorityFeePolicy::from_config(&config.bundle.priority_fee), oracle)?;

        // 4. 组装
        let composer = BundleComposer::new(
            ComposerSettings {
                chain_id: config.ethereum.chain_id,
                blocks_in_future: config.bundle.blocks_in_future,
                release_signer: config.bundle.release_signer,
                funding_endowment: config.funding_endowment(),
            },
            funding,
            exploited,
            recipient,
            splitter,
        );
        let calculator = PaymentCalculator::new(ledger.clone(), splitter);

        let rescue_service = Arc::new(RescueService::new(
            ledger,
            transport,
            calculator,
            composer,
            gas,
            RescueSettings {
                mode: config.run.mode,
                retry_delay: config.retry_delay(),
                max_attempts: config.run.max_attempts,
            },
        ));
        Ok(Self { rescue_service })
    }

    /// 运行救援循环直到终态
    pub async fn run(self) -> Result<RunSummary> {
        self.rescue_service.run().await
    }
}
