use super::types::{SimulationReport, SubmissionReceipt, parse_simulation, parse_submission};
use crate::config::RelayConfig;
use crate::errors::error::AppError;
use crate::infrastructure::provider::LedgerReader;
use crate::models::{BundleAttempt, Outcome, SignedBundle};
use crate::{log_debug, log_info, log_warn};
use async_trait::async_trait;
use ethers_core::utils::keccak256;
use ethers_signers::{LocalWallet, Signer};
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

const SIGNATURE_HEADER: &str = "X-Flashbots-Signature";

/// 私有 bundle 中继：模拟、提交、等待目标区块的结果
#[async_trait]
pub trait BundleTransport: Send + Sync {
    async fn simulate(
        &self,
        bundle: &SignedBundle,
        target_block: u64,
    ) -> Result<SimulationReport, AppError>;

    async fn submit(&self, attempt: &BundleAttempt) -> Result<SubmissionReceipt, AppError>;

    /// 阻塞到目标区块出现，再判定是否上链
    async fn wait(&self, attempt: &BundleAttempt) -> Result<Outcome, AppError>;
}

pub struct FlashbotsRelay {
    client: reqwest::Client,
    url: String,
    auth_signer: LocalWallet,
    ledger: Arc<dyn LedgerReader>,
    poll_interval: Duration,
}

impl FlashbotsRelay {
    pub fn new(
        config: &RelayConfig,
        auth_signer: LocalWallet,
        ledger: Arc<dyn LedgerReader>,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            auth_signer,
            ledger,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    /// EIP-191 签名 keccak256(body) 的 0x 十六进制字符串
    async fn sign_request(&self, body: &[u8]) -> Result<String, AppError> {
        let message = format!("0x{}", hex::encode(keccak256(body)));
        let signature = self
            .auth_signer
            .sign_message(message.as_bytes())
            .await
            .map_err(|e| AppError::Signing(format!("relay auth signing failed: {}", e)))?;
        Ok(format!(
            "{:?}:0x{}",
            self.auth_signer.address(),
            hex::encode(signature.to_vec())
        ))
    }

    async fn post(&self, method: &str, params: Value) -> Result<String, AppError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": [params],
        });
        let body = serde_json::to_vec(&payload)?;
        let signature = self.sign_request(&body).await?;

        let resp = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(
                SIGNATURE_HEADER,
                HeaderValue::from_str(&signature)
                    .map_err(|e| AppError::Relay(format!("Signature header invalid: {}", e)))?,
            )
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::Relay(format!("{} POST failed: {}", method, e)))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        log_debug!("{} -> {} body={}", method, status, text);
        // 中继对 JSON-RPC 错误也可能返回 4xx，body 中带有原因，交给调用方解析
        if status.is_server_error() {
            return Err(AppError::Relay(format!(
                "{} rejected: {} body={}",
                method, status, text
            )));
        }
        Ok(text)
    }
}

pub(crate) fn hex_block(number: u64) -> String {
    format!("0x{:x}", number)
}

fn raw_txs(bundle: &SignedBundle) -> Vec<String> {
    bundle
        .raw_transactions()
        .iter()
        .map(|raw| format!("0x{}", hex::encode(raw)))
        .collect()
}

/// 目标区块已过：全部回执存在 → 上链；签名账户 nonce 已越过 → 终止；否则未上链
pub async fn resolve_inclusion(
    ledger: &dyn LedgerReader,
    bundle: &SignedBundle,
) -> Result<Outcome, AppError> {
    let mut included = true;
    for leg in &bundle.legs {
        let receipt = ledger.get_transaction_receipt(leg.hash).await?;
        if receipt.is_none() {
            included = false;
            break;
        }
    }
    if included {
        return Ok(Outcome::Included);
    }

    for leg in &bundle.legs {
        let nonce = ledger.get_transaction_count(leg.from).await?;
        if nonce > leg.nonce {
            log_warn!(
                "{} 的 nonce 已是 {}，bundle 中 {} 使用 {}",
                leg.from,
                nonce,
                leg.kind,
                leg.nonce
            );
            return Ok(Outcome::AccountNonceTooHigh);
        }
    }
    Ok(Outcome::BlockPassedNotIncluded)
}

#[async_trait]
impl BundleTransport for FlashbotsRelay {
    async fn simulate(
        &self,
        bundle: &SignedBundle,
        target_block: u64,
    ) -> Result<SimulationReport, AppError> {
        let params = json!({
            "txs": raw_txs(bundle),
            "blockNumber": hex_block(target_block),
            "stateBlockNumber": "latest",
        });
        let body = self.post("eth_callBundle", params).await?;
        parse_simulation(&body)
    }

    async fn submit(&self, attempt: &BundleAttempt) -> Result<SubmissionReceipt, AppError> {
        let params = json!({
            "txs": raw_txs(&attempt.bundle),
            "blockNumber": hex_block(attempt.target_block),
            "replacementUuid": attempt.replacement_token.to_string(),
        });
        let body = self
            .post("eth_sendBundle", params)
            .await
            .map_err(|e| AppError::RelaySubmission(e.to_string()))?;
        let receipt = parse_submission(&body)?;
        log_info!(
            "bundle 已提交: target={} uuid={} hash={:?}",
            attempt.target_block,
            attempt.replacement_token,
            receipt.bundle_hash
        );
        Ok(receipt)
    }

    async fn wait(&self, attempt: &BundleAttempt) -> Result<Outcome, AppError> {
        loop {
            let head = self.ledger.get_last_block_number().await?;
            if head >= attempt.target_block {
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        resolve_inclusion(self.ledger.as_ref(), &attempt.bundle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers_core::types::Signature;
    use std::str::FromStr;

    #[test]
    fn block_numbers_are_hex_quantities() {
        assert_eq!(hex_block(17_000_000), "0x1036640");
        assert_eq!(hex_block(0), "0x0");
    }

    #[tokio::test]
    async fn request_signature_recovers_to_auth_address() {
        struct NoLedger;
        #[async_trait]
        impl LedgerReader for NoLedger {
            async fn get_chain_id(&self) -> Result<ethers_core::types::U256, AppError> {
                unreachable!()
            }
            async fn get_last_block_number(&self) -> Result<u64, AppError> {
                unreachable!()
            }
            async fn get_latest_block(&self) -> Result<crate::models::BlockHead, AppError> {
                unreachable!()
            }
            async fn get_balance(
                &self,
                _: ethers_core::types::Address,
            ) -> Result<ethers_core::types::U256, AppError> {
                unreachable!()
            }
            async fn get_transaction_count(
                &self,
                _: ethers_core::types::Address,
            ) -> Result<ethers_core::types::U256, AppError> {
                unreachable!()
            }
            async fn get_transaction_receipt(
                &self,
                _: ethers_core::types::H256,
            ) -> Result<Option<ethers_core::types::TransactionReceipt>, AppError> {
                unreachable!()
            }
            async fn call(
                &self,
                _: &ethers_core::types::transaction::eip2718::TypedTransaction,
            ) -> Result<ethers_core::types::Bytes, AppError> {
                unreachable!()
            }
            async fn estimate_gas(
                &self,
                _: &ethers_core::types::transaction::eip2718::TypedTransaction,
            ) -> Result<ethers_core::types::U256, AppError> {
                unreachable!()
            }
        }

        let wallet = LocalWallet::from_str(
            "0x0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
        )
        .unwrap();
        let config = RelayConfig {
            url: "https://relay.flashbots.net".into(),
            auth_private_key: String::new(),
            poll_interval_ms: 10,
            timeout_ms: 1_000,
        };
        let relay = FlashbotsRelay::new(&config, wallet.clone(), Arc::new(NoLedger)).unwrap();

        let body = br#"{"jsonrpc":"2.0","id":1,"method":"eth_sendBundle","params":[]}"#;
        let header = relay.sign_request(body).await.unwrap();
        let (address, sig_hex) = header.split_once(':').unwrap();
        assert_eq!(address, format!("{:?}", wallet.address()));

        let signature = Signature::from_str(sig_hex).unwrap();
        let message = format!("0x{}", hex::encode(keccak256(body)));
        assert_eq!(signature.recover(message.as_str()).unwrap(), wallet.address());
    }
}
