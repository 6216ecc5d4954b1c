use ethers_core::types::{Block, H256, U256};

/// 每轮尝试读取的链头快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHead {
    pub number: u64,
    pub hash: Option<H256>,
    pub timestamp: u64,
    /// London 之前的区块为 None
    pub base_fee_per_gas: Option<U256>,
}

impl BlockHead {
    pub fn new(number: u64, base_fee_per_gas: Option<U256>) -> Self {
        Self {
            number,
            hash: None,
            timestamp: 0,
            base_fee_per_gas,
        }
    }

    /// 区块缺少 number 时（pending 区块）返回 None
    pub fn from_ethers(block: &Block<H256>) -> Option<Self> {
        Some(Self {
            number: block.number?.as_u64(),
            hash: block.hash,
            timestamp: block.timestamp.low_u64(),
            base_fee_per_gas: block.base_fee_per_gas,
        })
    }
}
