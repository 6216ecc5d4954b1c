// services/tx/nonce/nonce_service.rs

use crate::errors::error::AppError;
use crate::infrastructure::provider::LedgerReader;
use ethers_core::types::{Address, U256};
use std::collections::HashMap;

/// 单轮尝试内的 nonce 分配。
///
/// 每轮都从链上重新读取，不跨轮缓存：上一轮若部分成功，链上 nonce 即为真相。
#[derive(Debug, Default, Clone)]
pub struct NonceBook {
    next: HashMap<Address, U256>,
}

impl NonceBook {
    pub async fn load(ledger: &dyn LedgerReader, accounts: &[Address]) -> Result<Self, AppError> {
        let mut next = HashMap::with_capacity(accounts.len());
        for account in accounts {
            if next.contains_key(account) {
                continue;
            }
            let nonce = ledger.get_transaction_count(*account).await?;
            next.insert(*account, nonce);
        }
        Ok(Self { next })
    }

    pub fn from_nonces(nonces: impl IntoIterator<Item = (Address, U256)>) -> Self {
        Self {
            next: nonces.into_iter().collect(),
        }
    }

    /// 按交易顺序依次占用
    pub fn acquire(&mut self, account: Address) -> Result<U256, AppError> {
        let slot = self.next.get_mut(&account).ok_or_else(|| {
            AppError::Internal(format!("nonce for {:?} was never loaded", account))
        })?;
        let nonce = *slot;
        *slot = nonce.saturating_add(U256::one());
        Ok(nonce)
    }
}
