// services/tx/signer/local_signer.rs

use crate::errors::error::AppError;
use crate::services::tx::signer::TxSigner;
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, Signature};
use ethers_signers::{LocalWallet, Signer};
use std::fmt;
use std::sync::Arc;

/// 本地私钥签名，附带账户角色名用于日志
#[derive(Clone)]
pub struct LocalSigner {
    role: &'static str,
    wallet: Arc<LocalWallet>,
}

impl LocalSigner {
    pub fn new(role: &'static str, wallet: LocalWallet) -> Self {
        Self {
            role,
            wallet: Arc::new(wallet),
        }
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("role", &self.role)
            .field("address", &self.wallet.address())
            .finish()
    }
}

#[async_trait::async_trait]
impl TxSigner for LocalSigner {
    async fn sign_tx(&self, tx: &TypedTransaction) -> Result<Signature, AppError> {
        if let Some(tx_chain) = tx.chain_id() {
            if tx_chain.as_u64() != self.wallet.chain_id() {
                return Err(AppError::Signing(format!(
                    "{} signer is bound to chain {} but tx targets chain {}",
                    self.role,
                    self.wallet.chain_id(),
                    tx_chain
                )));
            }
        }
        self.wallet
            .sign_transaction(tx)
            .await
            .map_err(|e| AppError::Signing(format!("{} signer: {}", self.role, e)))
    }

    fn address(&self) -> Address {
        self.wallet.address()
    }
}
