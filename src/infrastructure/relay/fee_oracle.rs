use crate::errors::error::AppError;
use async_trait::async_trait;
use ethers_core::types::U256;
use ethers_core::utils::parse_units;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use std::time::Duration;

/// 外部 priority fee 建议服务
#[async_trait]
pub trait FeeOracle: Send + Sync {
    /// 返回 wei
    async fn suggested_priority_fee(&self) -> Result<U256, AppError>;
}

/// blockprices 风格的接口：按 confidence 分档给出 gwei 小数
pub struct BlockPriceOracle {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    confidence: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockPricesResponse {
    #[serde(default)]
    block_prices: Vec<BlockPrice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockPrice {
    #[serde(default)]
    estimated_prices: Vec<EstimatedPrice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EstimatedPrice {
    confidence: u8,
    max_priority_fee_per_gas: f64,
}

impl BlockPriceOracle {
    pub fn new(
        url: String,
        api_key: Option<String>,
        confidence: u8,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            api_key,
            confidence,
        })
    }
}

/// 取满足最低 confidence 的最高档位
fn pick_priority_fee(body: &str, min_confidence: u8) -> Result<U256, AppError> {
    let parsed: BlockPricesResponse = serde_json::from_str(body)
        .map_err(|e| AppError::FeeOracle(format!("malformed response: {}", e)))?;
    let estimate = parsed
        .block_prices
        .first()
        .and_then(|block| {
            block
                .estimated_prices
                .iter()
                .filter(|p| p.confidence >= min_confidence)
                .max_by_key(|p| p.confidence)
        })
        .ok_or_else(|| {
            AppError::FeeOracle(format!("no estimate with confidence >= {}", min_confidence))
        })?;

    if !estimate.max_priority_fee_per_gas.is_finite() || estimate.max_priority_fee_per_gas < 0.0 {
        return Err(AppError::FeeOracle(format!(
            "nonsensical priority fee {}",
            estimate.max_priority_fee_per_gas
        )));
    }
    // 最多保留 9 位小数（1 wei）
    let gwei = format!("{:.9}", estimate.max_priority_fee_per_gas);
    let wei = parse_units(&gwei, "gwei")
        .map_err(|e| AppError::FeeOracle(format!("cannot convert {} gwei: {}", gwei, e)))?;
    Ok(wei.into())
}

#[async_trait]
impl FeeOracle for BlockPriceOracle {
    async fn suggested_priority_fee(&self) -> Result<U256, AppError> {
        let mut request = self.client.get(&self.url);
        if let Some(key) = &self.api_key {
            request = request.header(AUTHORIZATION, key);
        }
        let resp = request
            .send()
            .await
            .map_err(|e| AppError::FeeOracle(format!("request failed: {}", e)))?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AppError::FeeOracle(format!("{} body={}", status, body)));
        }
        pick_priority_fee(&body, self.confidence)
    }
}
