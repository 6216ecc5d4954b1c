use crate::utils::{to_ether, to_gwei};
use ethers_core::types::U256;
use std::fmt;

/// 单次尝试的救援计划，每轮从最新链头重新计算，不跨轮复用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RescuePlan {
    pub current_block: u64,
    pub target_block: u64,
    pub base_fee: U256,
    pub amount_owed: U256,
    pub gas_limit_for_release: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

impl fmt::Display for RescuePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block={} target={} baseFee={} gwei owed={} ETH releaseGas={} maxFee={} gwei tip={} gwei",
            self.current_block,
            self.target_block,
            to_gwei(self.base_fee),
            to_ether(self.amount_owed),
            self.gas_limit_for_release,
            to_gwei(self.max_fee_per_gas),
            to_gwei(self.max_priority_fee_per_gas),
        )
    }
}
