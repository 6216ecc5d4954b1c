// services/tx/gas/gas_strategy.rs

use crate::config::{GWEI, PriorityFeeConfig};
use ethers_core::types::U256;

/// priority fee 来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriorityFeePolicy {
    /// 固定 tip，每次未上链后按百分比升级，直到上限
    Fixed {
        base: U256,
        escalation_percent: u64,
        max: Option<U256>,
    },
    /// 每轮从外部服务获取
    Service { strict_fee_cap: bool },
}

impl PriorityFeePolicy {
    pub fn from_config(config: &PriorityFeeConfig) -> Self {
        match config {
            PriorityFeeConfig::Fixed {
                gwei,
                escalation_percent,
                max_gwei,
            } => PriorityFeePolicy::Fixed {
                base: gwei_to_wei(*gwei),
                escalation_percent: *escalation_percent,
                max: max_gwei.map(gwei_to_wei),
            },
            PriorityFeeConfig::Service { strict_fee_cap, .. } => PriorityFeePolicy::Service {
                strict_fee_cap: *strict_fee_cap,
            },
        }
    }

    /// 部分中继拒绝 maxFee 恰好等于上限的交易，服务定价时减 1 wei
    pub fn strict_fee_cap(&self) -> bool {
        matches!(
            self,
            PriorityFeePolicy::Service {
                strict_fee_cap: true
            }
        )
    }

    /// 连续 `misses` 次未上链后的固定 tip：base × (percent/100)^misses，封顶 max
    pub fn escalated_fixed_fee(&self, misses: u32) -> Option<U256> {
        let PriorityFeePolicy::Fixed {
            base,
            escalation_percent,
            max,
        } = self
        else {
            return None;
        };
        let percent = U256::from(*escalation_percent);
        let hundred = U256::from(100u64);
        let mut fee = *base;
        for _ in 0..misses {
            let next = fee.saturating_mul(percent) / hundred;
            if let Some(cap) = max {
                if next >= *cap {
                    return Some(*cap);
                }
            }
            if next == fee {
                break;
            }
            fee = next;
        }
        Some(match max {
            Some(cap) => fee.min(*cap),
            None => fee,
        })
    }
}

pub fn gwei_to_wei(gwei: u64) -> U256 {
    U256::from(gwei) * U256::from(GWEI)
}
