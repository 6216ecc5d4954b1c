// services/tx/gas/gas_service.rs

use crate::errors::error::AppError;
use crate::infrastructure::relay::FeeOracle;
use crate::services::tx::gas::gas_strategy::PriorityFeePolicy;
use ethers_core::types::U256;
use std::sync::Arc;

/// EIP-1559 单块 base fee 最大涨幅 12.5%
const BASE_FEE_GROWTH_NUMERATOR: u64 = 1125;
const BASE_FEE_GROWTH_DENOMINATOR: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeParams {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// 假设未来每个区块 base fee 都按上限上涨，得到 `blocks` 个区块后的最坏 base fee。
/// 每块向上多取 1 wei，抵消截断。
pub fn max_base_fee_in_future_block(base_fee: U256, blocks: u64) -> U256 {
    let numerator = U256::from(BASE_FEE_GROWTH_NUMERATOR);
    let denominator = U256::from(BASE_FEE_GROWTH_DENOMINATOR);
    let mut max_base_fee = base_fee;
    for _ in 0..blocks {
        max_base_fee = (max_base_fee.saturating_mul(numerator) / denominator).saturating_add(U256::one());
    }
    max_base_fee
}

/// maxFee = 最坏 base fee + tip（strict 时再减 1 wei，但不低于 tip）
pub fn fee_params(base_fee: U256, horizon: u64, priority_fee: U256, strict_cap: bool) -> FeeParams {
    let mut max_fee_per_gas =
        max_base_fee_in_future_block(base_fee, horizon).saturating_add(priority_fee);
    if strict_cap && max_fee_per_gas > priority_fee {
        max_fee_per_gas -= U256::one();
    }
    FeeParams {
        max_fee_per_gas,
        max_priority_fee_per_gas: priority_fee,
    }
}

/// Gas 费用计算服务（纯整数运算，无浮点风险）
#[derive(Clone)]
pub struct GasService {
    policy: PriorityFeePolicy,
    oracle: Option<Arc<dyn FeeOracle>>,
}

impl GasService {
    pub fn new(policy: PriorityFeePolicy, oracle: Option<Arc<dyn FeeOracle>>) -> Result<Self, AppError> {
        if matches!(policy, PriorityFeePolicy::Service { .. }) && oracle.is_none() {
            return Err(AppError::Validation(
                "service priority fee policy requires a fee oracle".into(),
            ));
        }
        Ok(Self { policy, oracle })
    }

    /// 当前应使用的 tip；`misses` 为连续未上链次数
    pub async fn priority_fee(&self, misses: u32) -> Result<U256, AppError> {
        if let Some(fee) = self.policy.escalated_fixed_fee(misses) {
            return Ok(fee);
        }
        match &self.oracle {
            Some(oracle) => oracle.suggested_priority_fee().await,
            None => Err(AppError::Validation(
                "service priority fee policy requires a fee oracle".into(),
            )),
        }
    }

    pub async fn resolve_fees(
        &self,
        base_fee: U256,
        horizon: u64,
        misses: u32,
    ) -> Result<FeeParams, AppError> {
        let priority_fee = self.priority_fee(misses).await?;
        Ok(fee_params(
            base_fee,
            horizon,
            priority_fee,
            self.policy.strict_fee_cap(),
        ))
    }
}
