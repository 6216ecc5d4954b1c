// services/bundle/bundle_composer.rs

use crate::config::ReleaseSigner;
use crate::errors::error::AppError;
use crate::infrastructure::provider::LedgerReader;
use crate::log_info;
use crate::models::{
    BundleLeg, LegKind, RescuePlan, SignedBundle, SignedLeg, SignerRole, TransactionSet,
    UnsignedTransaction,
};
use crate::services::payment::splitter_abi;
use crate::services::tx::nonce::NonceBook;
use crate::services::tx::signer::TxSigner;
use crate::utils::to_ether;
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, Bytes, Eip1559TransactionRequest, U256};
use std::sync::Arc;

/// 纯 ETH 转账的 gas
pub const TRANSFER_GAS: u64 = 21_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposerSettings {
    pub chain_id: u64,
    pub blocks_in_future: u64,
    pub release_signer: ReleaseSigner,
    /// 固定注资额；None 时按 maxFee × gas 计算
    pub funding_endowment: Option<U256>,
}

pub struct BundleComposer {
    settings: ComposerSettings,
    funding: Arc<dyn TxSigner>,
    exploited: Arc<dyn TxSigner>,
    recipient: Address,
    splitter: Address,
}

impl BundleComposer {
    pub fn new(
        settings: ComposerSettings,
        funding: Arc<dyn TxSigner>,
        exploited: Arc<dyn TxSigner>,
        recipient: Address,
        splitter: Address,
    ) -> Self {
        Self {
            settings,
            funding,
            exploited,
            recipient,
            splitter,
        }
    }

    pub fn settings(&self) -> &ComposerSettings {
        &self.settings
    }

    pub fn funding_address(&self) -> Address {
        self.funding.address()
    }

    pub fn exploited_address(&self) -> Address {
        self.exploited.address()
    }

    pub fn release_role(&self) -> SignerRole {
        match self.settings.release_signer {
            ReleaseSigner::Funding => SignerRole::Funding,
            ReleaseSigner::Exploited => SignerRole::Exploited,
        }
    }

    fn signer(&self, role: SignerRole) -> &Arc<dyn TxSigner> {
        match role {
            SignerRole::Funding => &self.funding,
            SignerRole::Exploited => &self.exploited,
        }
    }

    /// 目标区块 = 当前区块 + N，与 fee 推算的区块数一致
    pub fn target_block(&self, current_block: u64) -> u64 {
        current_block.saturating_add(self.settings.blocks_in_future)
    }

    /// 用于 eth_estimateGas 的 release 调用
    pub fn release_request(&self) -> TypedTransaction {
        Eip1559TransactionRequest::new()
            .from(self.signer(self.release_role()).address())
            .to(self.splitter)
            .data(splitter_abi::release_call(self.exploited_address()))
            .chain_id(self.settings.chain_id)
            .into()
    }

    /// 估算失败直接向上传播，绝不编造 gas limit
    pub async fn estimate_release_gas(&self, ledger: &dyn LedgerReader) -> Result<U256, AppError> {
        let gas = ledger.estimate_gas(&self.release_request()).await?;
        if gas.is_zero() {
            return Err(AppError::GasEstimation(
                "node returned zero gas for release()".into(),
            ));
        }
        Ok(gas)
    }

    /// exploited 账户需要自付的所有交易的最坏 gas 成本
    pub fn exploited_gas_budget(&self, plan: &RescuePlan) -> U256 {
        let mut gas = U256::from(TRANSFER_GAS);
        if self.release_role() == SignerRole::Exploited {
            gas = gas.saturating_add(plan.gas_limit_for_release);
        }
        gas.saturating_mul(plan.max_fee_per_gas)
    }

    fn unsigned(
        &self,
        plan: &RescuePlan,
        to: Address,
        value: U256,
        data: Bytes,
        gas: U256,
        nonce: U256,
    ) -> UnsignedTransaction {
        UnsignedTransaction {
            to,
            value,
            data,
            gas_limit: gas,
            max_fee_per_gas: plan.max_fee_per_gas,
            max_priority_fee_per_gas: plan.max_priority_fee_per_gas,
            chain_id: self.settings.chain_id,
            nonce,
        }
    }

    /// 固定形状：[注资] → release → 转出。exploited 余额已够付 gas 时省略注资。
    pub fn compose(
        &self,
        plan: &RescuePlan,
        exploited_balance: U256,
        nonces: &mut NonceBook,
    ) -> Result<TransactionSet, AppError> {
        let exploited = self.exploited_address();
        let mut set = TransactionSet::new();

        let budget = self.exploited_gas_budget(plan);
        if exploited_balance < budget {
            let value = self.settings.funding_endowment.unwrap_or(budget);
            let nonce = nonces.acquire(self.funding_address())?;
            set.push(BundleLeg {
                kind: LegKind::FundGas,
                signer: SignerRole::Funding,
                tx: self.unsigned(
                    plan,
                    exploited,
                    value,
                    Bytes::default(),
                    U256::from(TRANSFER_GAS),
                    nonce,
                ),
            });
        }

        let release_role = self.release_role();
        let nonce = nonces.acquire(self.signer(release_role).address())?;
        set.push(BundleLeg {
            kind: LegKind::Release,
            signer: release_role,
            tx: self.unsigned(
                plan,
                self.splitter,
                U256::zero(),
                splitter_abi::release_call(exploited),
                plan.gas_limit_for_release,
                nonce,
            ),
        });

        let nonce = nonces.acquire(exploited)?;
        set.push(BundleLeg {
            kind: LegKind::Forward,
            signer: SignerRole::Exploited,
            tx: self.unsigned(
                plan,
                self.recipient,
                plan.amount_owed,
                Bytes::default(),
                U256::from(TRANSFER_GAS),
                nonce,
            ),
        });

        if !set.is_ordered() {
            return Err(AppError::Internal("bundle legs out of order".into()));
        }
        Ok(set)
    }

    pub async fn sign(&self, set: &TransactionSet) -> Result<SignedBundle, AppError> {
        let mut legs = Vec::with_capacity(set.legs().len());
        for leg in set.legs() {
            let signer = self.signer(leg.signer);
            let typed = leg.tx.to_typed(signer.address());
            let (raw, hash) = signer.sign_raw(&typed).await?;
            log_info!(
                "  [{}] {:?} -> {:?} value={} ETH nonce={} gas={} hash={:#x}",
                leg.kind,
                signer.address(),
                leg.tx.to,
                to_ether(leg.tx.value),
                leg.tx.nonce,
                leg.tx.gas_limit,
                hash
            );
            legs.push(SignedLeg {
                kind: leg.kind,
                signer: leg.signer,
                from: signer.address(),
                to: leg.tx.to,
                value: leg.tx.value,
                nonce: leg.tx.nonce,
                hash,
                raw,
            });
        }
        Ok(SignedBundle { legs })
    }
}
