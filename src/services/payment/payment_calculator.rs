// services/payment/payment_calculator.rs

use crate::errors::error::AppError;
use crate::infrastructure::provider::LedgerReader;
use crate::log_debug;
use crate::services::payment::splitter_abi;
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, Bytes, TransactionRequest, U256};
use std::sync::Arc;

/// splitter 合约在某一时刻的相关读数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitterState {
    pub balance: U256,
    pub total_released: U256,
    pub total_shares: U256,
    pub shares: U256,
    pub released: U256,
}

impl SplitterState {
    /// owed = (balance + totalReleased) * shares / totalShares - released
    ///
    /// 截断除法与合约自身的取整一致，链下结果不会超过 release 实际支付的金额。
    pub fn amount_owed(&self) -> Result<U256, AppError> {
        if self.total_shares.is_zero() {
            return Err(AppError::InvalidPlan("splitter has zero total shares".into()));
        }
        if self.shares > self.total_shares {
            return Err(AppError::InvalidPlan(format!(
                "shares {} exceed total shares {}",
                self.shares, self.total_shares
            )));
        }
        let total_received = self
            .balance
            .checked_add(self.total_released)
            .ok_or_else(|| AppError::InvalidPlan("total received overflows".into()))?;
        let entitled = total_received
            .checked_mul(self.shares)
            .ok_or_else(|| AppError::InvalidPlan("entitlement overflows".into()))?
            / self.total_shares;
        entitled.checked_sub(self.released).ok_or_else(|| {
            AppError::InvalidPlan(format!(
                "released {} exceeds entitlement {}",
                self.released, entitled
            ))
        })
    }
}

pub struct PaymentCalculator {
    ledger: Arc<dyn LedgerReader>,
    splitter: Address,
}

impl PaymentCalculator {
    pub fn new(ledger: Arc<dyn LedgerReader>, splitter: Address) -> Self {
        Self { ledger, splitter }
    }

    async fn read_uint(&self, data: Bytes) -> Result<U256, AppError> {
        let tx: TypedTransaction = TransactionRequest::new().to(self.splitter).data(data).into();
        let output = self.ledger.call(&tx).await?;
        splitter_abi::decode_uint(&output)
    }

    /// 每轮都重新读取，不缓存
    pub async fn read_state(&self, account: Address) -> Result<SplitterState, AppError> {
        let balance = self.ledger.get_balance(self.splitter).await?;
        let total_released = self
            .read_uint(splitter_abi::total_released_call())
            .await?;
        let total_shares = self.read_uint(splitter_abi::total_shares_call()).await?;
        let shares = self.read_uint(splitter_abi::shares_call(account)).await?;
        let released = self.read_uint(splitter_abi::released_call(account)).await?;

        let state = SplitterState {
            balance,
            total_released,
            total_shares,
            shares,
            released,
        };
        log_debug!("splitter {:?} state for {:?}: {:?}", self.splitter, account, state);
        Ok(state)
    }

    pub async fn amount_owed(&self, account: Address) -> Result<U256, AppError> {
        self.read_state(account).await?.amount_owed()
    }
}
