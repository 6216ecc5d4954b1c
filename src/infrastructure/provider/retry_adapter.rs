use super::ethereum_provider::{EthereumProvider, LedgerReader, head_from_block};
use crate::errors::error::AppError;
use crate::log_warn;
use crate::models::BlockHead;
use async_trait::async_trait;
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, BlockNumber, Bytes, H256, TransactionReceipt, U256};
use ethers_providers::{Http, Middleware, Provider, ProviderError};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// 网络层重试：指数退避 + 0~10% 抖动，每次重试换一个 provider
pub struct RetryAdapter {
    provider: Arc<EthereumProvider>,
    max_retries: usize,
    base_delay: Duration,
}

impl RetryAdapter {
    pub fn new(provider: Arc<EthereumProvider>, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            provider,
            max_retries: max_retries.max(1),
            base_delay,
        }
    }

    async fn retry_call<T, Fut, F>(&self, label: &str, mut f: F) -> Result<T, ProviderError>
    where
        F: FnMut(Arc<Provider<Http>>) -> Fut + Send,
        Fut: Future<Output = Result<T, ProviderError>> + Send,
    {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = backoff_delay(self.base_delay, attempt);
                log_warn!(
                    "{} 第 {} 次重试，等待 {:?}...",
                    label,
                    attempt + 1,
                    delay
                );
                sleep(delay).await;
            }
            match f(self.provider.get_provider()).await {
                Ok(result) => return Ok(result),
                Err(e) if attempt + 1 < self.max_retries => {
                    log_warn!("{} 调用失败 (第 {} 次): {}", label, attempt + 1, e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// base * 2^(attempt-1)，指数上限 2^10，外加 0~10% 抖动
fn backoff_delay(base: Duration, attempt: usize) -> Duration {
    let exponent = (attempt.saturating_sub(1)).min(10) as u32;
    let delay_ms = (base.as_millis() as u64).saturating_mul(1u64 << exponent);
    let jitter = rand::thread_rng().gen_range(0..=(delay_ms / 10 + 1));
    Duration::from_millis(delay_ms + jitter)
}

fn exhausted(label: &str, e: ProviderError) -> AppError {
    AppError::ProviderError(format!("{} 重试后仍失败: {}", label, e))
}

#[async_trait]
impl LedgerReader for RetryAdapter {
    async fn get_chain_id(&self) -> Result<U256, AppError> {
        self.retry_call("eth_chainId", |p| async move { p.get_chainid().await })
            .await
            .map_err(|e| exhausted("eth_chainId", e))
    }

    async fn get_last_block_number(&self) -> Result<u64, AppError> {
        self.retry_call("eth_blockNumber", |p| async move { p.get_block_number().await })
            .await
            .map(|n| n.as_u64())
            .map_err(|e| exhausted("eth_blockNumber", e))
    }

    async fn get_latest_block(&self) -> Result<BlockHead, AppError> {
        let block = self
            .retry_call("eth_getBlockByNumber", |p| async move {
                p.get_block(BlockNumber::Latest).await
            })
            .await
            .map_err(|e| exhausted("eth_getBlockByNumber", e))?;
        head_from_block(block)
    }

    async fn get_balance(&self, address: Address) -> Result<U256, AppError> {
        self.retry_call("eth_getBalance", move |p| async move {
            p.get_balance(address, None).await
        })
        .await
        .map_err(|e| exhausted("eth_getBalance", e))
    }

    async fn get_transaction_count(&self, address: Address) -> Result<U256, AppError> {
        self.retry_call("eth_getTransactionCount", move |p| async move {
            p.get_transaction_count(address, Some(BlockNumber::Latest.into()))
                .await
        })
        .await
        .map_err(|e| exhausted("eth_getTransactionCount", e))
    }

    async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, AppError> {
        self.retry_call("eth_getTransactionReceipt", move |p| async move {
            p.get_transaction_receipt(tx_hash).await
        })
        .await
        .map_err(|e| exhausted("eth_getTransactionReceipt", e))
    }

    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, AppError> {
        self.retry_call("eth_call", move |p| {
            let tx = tx.clone();
            async move { p.call(&tx, None).await }
        })
        .await
        .map_err(|e| exhausted("eth_call", e))
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, AppError> {
        self.retry_call("eth_estimateGas", move |p| {
            let tx = tx.clone();
            async move { p.estimate_gas(&tx, None).await }
        })
        .await
        .map_err(|e| AppError::GasEstimation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_retry_waits_about_base_delay() {
        let delay = backoff_delay(Duration::from_millis(100), 1);
        assert!(delay >= Duration::from_millis(100));
        assert!(delay <= Duration::from_millis(111));
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let third = backoff_delay(Duration::from_millis(100), 3);
        assert!(third >= Duration::from_millis(400));
        let capped = backoff_delay(Duration::from_millis(1), 50);
        assert!(capped >= Duration::from_millis(1024));
        assert!(capped <= Duration::from_millis(1024 + 103));
    }
}
