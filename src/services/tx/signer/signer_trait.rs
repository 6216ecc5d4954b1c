use crate::errors::error::AppError;
use async_trait::async_trait;
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, Bytes, H256, Signature};
use ethers_core::utils::keccak256;

#[async_trait]
pub trait TxSigner: Send + Sync {
    async fn sign_tx(&self, tx: &TypedTransaction) -> Result<Signature, AppError>;
    fn address(&self) -> Address;

    /// 签名并返回 (RLP 原始交易, 交易哈希)
    async fn sign_raw(&self, tx: &TypedTransaction) -> Result<(Bytes, H256), AppError> {
        let signature = self.sign_tx(tx).await?;
        let raw = tx.rlp_signed(&signature);
        let hash = H256::from(keccak256(&raw));
        Ok((raw, hash))
    }
}
