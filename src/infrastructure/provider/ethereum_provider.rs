use crate::config::EthereumConfig;
use crate::errors::error::AppError;
use crate::log_info;
use crate::models::BlockHead;
use async_trait::async_trait;
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, BlockNumber, Bytes, H256, TransactionReceipt, U256};
use ethers_providers::{Http, Middleware, Provider};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use url::Url;

/// 链上只读访问（救援流程唯一依赖的 RPC 面）
#[async_trait]
pub trait LedgerReader: Send + Sync {
    async fn get_chain_id(&self) -> Result<U256, AppError>;
    async fn get_last_block_number(&self) -> Result<u64, AppError>;
    async fn get_latest_block(&self) -> Result<BlockHead, AppError>;
    async fn get_balance(&self, address: Address) -> Result<U256, AppError>;
    /// latest 状态下的 nonce
    async fn get_transaction_count(&self, address: Address) -> Result<U256, AppError>;
    async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, AppError>;
    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, AppError>;
    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, AppError>;
}

/// 多个 api key 轮询的 HTTP provider 池
pub struct EthereumProvider {
    providers: Vec<Arc<Provider<Http>>>,
    index: AtomicUsize,
}

impl EthereumProvider {
    pub fn new(config: &EthereumConfig) -> Result<Self, AppError> {
        let providers = endpoint_urls(config)?
            .into_iter()
            .map(|url| {
                Provider::<Http>::try_from(url.as_str())
                    .map(Arc::new)
                    .map_err(|e| AppError::Validation(format!("Invalid RPC URL {}: {}", url, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        log_info!("成功初始化 {} 个RPC Provider", providers.len());
        Ok(Self {
            providers,
            index: AtomicUsize::new(0),
        })
    }

    pub fn get_provider(&self) -> Arc<Provider<Http>> {
        let i = self.index.fetch_add(1, Ordering::Relaxed);
        self.providers[i % self.providers.len()].clone()
    }
}

/// api_keys 为空时直接使用 rpc_url，否则把每个 key 拼到路径末尾
fn endpoint_urls(config: &EthereumConfig) -> Result<Vec<Url>, AppError> {
    let base = Url::parse(&config.rpc_url)
        .map_err(|e| AppError::Validation(format!("Invalid base RPC URL: {}", e)))?;

    let keys: Vec<&str> = config
        .api_keys
        .split(',')
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    if keys.is_empty() {
        return Ok(vec![base]);
    }

    keys.into_iter()
        .map(|key| {
            let joined = if config.rpc_url.ends_with('/') {
                format!("{}{}", config.rpc_url, key)
            } else {
                format!("{}/{}", config.rpc_url, key)
            };
            Url::parse(&joined)
                .map_err(|e| AppError::Validation(format!("Invalid RPC URL {}: {}", joined, e)))
        })
        .collect()
}

pub(crate) fn head_from_block(
    block: Option<ethers_core::types::Block<H256>>,
) -> Result<BlockHead, AppError> {
    let block =
        block.ok_or_else(|| AppError::BlockchainError("latest block not available".into()))?;
    BlockHead::from_ethers(&block)
        .ok_or_else(|| AppError::BlockchainError("latest block has no number".into()))
}

#[async_trait]
impl LedgerReader for EthereumProvider {
    async fn get_chain_id(&self) -> Result<U256, AppError> {
        self.get_provider()
            .get_chainid()
            .await
            .map_err(AppError::from)
    }

    async fn get_last_block_number(&self) -> Result<u64, AppError> {
        self.get_provider()
            .get_block_number()
            .await
            .map(|n| n.as_u64())
            .map_err(AppError::from)
    }

    async fn get_latest_block(&self) -> Result<BlockHead, AppError> {
        let block = self
            .get_provider()
            .get_block(BlockNumber::Latest)
            .await
            .map_err(AppError::from)?;
        head_from_block(block)
    }

    async fn get_balance(&self, address: Address) -> Result<U256, AppError> {
        self.get_provider()
            .get_balance(address, None)
            .await
            .map_err(AppError::from)
    }

    async fn get_transaction_count(&self, address: Address) -> Result<U256, AppError> {
        self.get_provider()
            .get_transaction_count(address, Some(BlockNumber::Latest.into()))
            .await
            .map_err(AppError::from)
    }

    async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, AppError> {
        self.get_provider()
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(AppError::from)
    }

    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, AppError> {
        self.get_provider()
            .call(tx, None)
            .await
            .map_err(|e| AppError::ProviderError(format!("eth_call failed: {}", e)))
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, AppError> {
        self.get_provider()
            .estimate_gas(tx, None)
            .await
            .map_err(|e| AppError::GasEstimation(e.to_string()))
    }
}
