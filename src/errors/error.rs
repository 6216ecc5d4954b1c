use ethers_core::abi::Error as AbiError;
use ethers_providers::ProviderError;
use ethers_signers::WalletError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("无效的地址: {0}")]
    InvalidAddress(String),

    #[error("无效的私钥 ({role}): {reason}")]
    InvalidKey { role: &'static str, reason: String },

    #[error("无效的provider: {0}")]
    ProviderError(String),

    #[error("区块链RPC错误: {0}")]
    BlockchainError(String),

    /// 最新区块没有 base fee（London 之前的链状态或节点误报）
    #[error("区块 {0} 缺少 baseFeePerGas")]
    MissingBaseFee(u64),

    #[error("Gas estimation failed: {0}")]
    GasEstimation(String),

    #[error("ABI 编解码错误: {0}")]
    Abi(String),

    /// 链上读数推出的应付金额不合理（负数、份额越界等）
    #[error("无效的救援计划: {0}")]
    InvalidPlan(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    /// 中继的网络/协议层错误（模拟或等待阶段）
    #[error("Relay error: {0}")]
    Relay(String),

    /// 中继拒绝了 eth_sendBundle 本身
    #[error("Relay rejected bundle submission: {0}")]
    RelaySubmission(String),

    #[error("Fee oracle error: {0}")]
    FeeOracle(String),

    /// 内部不可预期错误（兜底）
    #[error("内部错误: {0}")]
    Internal(String),
}

impl AppError {
    /// 是否可以在下一轮尝试中自然恢复（不终止进程）
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::ProviderError(_)
                | AppError::BlockchainError(_)
                | AppError::MissingBaseFee(_)
                | AppError::GasEstimation(_)
                | AppError::Abi(_)
                | AppError::InvalidPlan(_)
                | AppError::Relay(_)
                | AppError::FeeOracle(_)
        )
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        AppError::ProviderError(err.to_string())
    }
}

impl From<AbiError> for AppError {
    fn from(err: AbiError) -> Self {
        AppError::Abi(err.to_string())
    }
}

impl From<WalletError> for AppError {
    fn from(err: WalletError) -> Self {
        AppError::Signing(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Relay(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Relay(format!("malformed JSON: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_rejection_is_not_transient() {
        assert!(!AppError::RelaySubmission("bad payload".into()).is_transient());
        assert!(!AppError::Validation("horizon".into()).is_transient());
    }

    #[test]
    fn read_failures_are_transient() {
        assert!(AppError::MissingBaseFee(12).is_transient());
        assert!(AppError::ProviderError("timeout".into()).is_transient());
        assert!(AppError::InvalidPlan("negative".into()).is_transient());
    }
}
