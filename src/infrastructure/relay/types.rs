use crate::errors::error::AppError;
use ethers_core::types::{H256, U256};
use serde::Deserialize;
use serde_json::Value;

/// eth_callBundle 的结果摘要
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationReport {
    pub bundle_hash: Option<H256>,
    pub total_gas_used: U256,
    pub coinbase_diff: U256,
    /// 中继层面的错误（整个 bundle 无法模拟）
    pub error: Option<String>,
    /// 第一笔 revert 的交易及原因
    pub first_revert: Option<String>,
}

impl SimulationReport {
    pub fn failure_reason(&self) -> Option<String> {
        self.error.clone().or_else(|| self.first_revert.clone())
    }

    /// 给到出块者的有效 gas 价格 = coinbaseDiff / totalGasUsed
    pub fn effective_gas_price(&self) -> U256 {
        if self.total_gas_used.is_zero() {
            U256::zero()
        } else {
            self.coinbase_diff / self.total_gas_used
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub bundle_hash: Option<H256>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcError {
    #[serde(default)]
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallBundleResult {
    #[serde(default)]
    bundle_hash: Option<H256>,
    #[serde(default)]
    coinbase_diff: Option<String>,
    #[serde(default)]
    total_gas_used: Option<u64>,
    #[serde(default)]
    results: Vec<CallBundleTx>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallBundleTx {
    #[serde(default)]
    tx_hash: Option<H256>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    revert: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendBundleResult {
    #[serde(default)]
    bundle_hash: Option<H256>,
}

pub(crate) fn parse_simulation(body: &str) -> Result<SimulationReport, AppError> {
    let response: JsonRpcResponse = serde_json::from_str(body)?;
    if let Some(err) = response.error {
        return Ok(SimulationReport {
            error: Some(format!("{} (code {})", err.message, err.code)),
            ..Default::default()
        });
    }
    let result = response
        .result
        .ok_or_else(|| AppError::Relay(format!("eth_callBundle returned no result: {}", body)))?;
    let parsed: CallBundleResult = serde_json::from_value(result)?;

    let first_revert = parsed
        .results
        .iter()
        .find(|tx| tx.error.is_some() || tx.revert.is_some())
        .map(|tx| {
            let reason = tx
                .revert
                .clone()
                .or_else(|| tx.error.clone())
                .unwrap_or_default();
            match tx.tx_hash {
                Some(hash) => format!("{:#x}: {}", hash, reason),
                None => reason,
            }
        });

    let coinbase_diff = match parsed.coinbase_diff {
        Some(raw) => U256::from_dec_str(&raw)
            .map_err(|e| AppError::Relay(format!("bad coinbaseDiff {}: {}", raw, e)))?,
        None => U256::zero(),
    };

    Ok(SimulationReport {
        bundle_hash: parsed.bundle_hash,
        total_gas_used: U256::from(parsed.total_gas_used.unwrap_or_default()),
        coinbase_diff,
        error: None,
        first_revert,
    })
}

pub(crate) fn parse_submission(body: &str) -> Result<SubmissionReceipt, AppError> {
    let response: JsonRpcResponse = serde_json::from_str(body)
        .map_err(|e| AppError::RelaySubmission(format!("malformed response {}: {}", body, e)))?;
    if let Some(err) = response.error {
        return Err(AppError::RelaySubmission(format!(
            "{} (code {})",
            err.message, err.code
        )));
    }
    let bundle_hash = response
        .result
        .and_then(|v| serde_json::from_value::<SendBundleResult>(v).ok())
        .and_then(|r| r.bundle_hash);
    Ok(SubmissionReceipt { bundle_hash })
}
