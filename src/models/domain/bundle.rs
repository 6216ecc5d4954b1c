use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, Bytes, Eip1559TransactionRequest, H256, U256};
use std::fmt;
use uuid::Uuid;

/// 需要签名的两类账户；收款人只有地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignerRole {
    Funding,
    Exploited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegKind {
    /// Funding → Exploited，补足 gas
    FundGas,
    /// 调用 splitter.release(exploited)
    Release,
    /// Exploited → Recipient，转出应得款
    Forward,
}

impl fmt::Display for LegKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LegKind::FundGas => "fund-gas",
            LegKind::Release => "release",
            LegKind::Forward => "forward",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub gas_limit: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub chain_id: u64,
    pub nonce: U256,
}

impl UnsignedTransaction {
    /// EIP-1559 (type 2) 交易
    pub fn to_typed(&self, from: Address) -> TypedTransaction {
        Eip1559TransactionRequest::new()
            .from(from)
            .to(self.to)
            .value(self.value)
            .data(self.data.clone())
            .gas(self.gas_limit)
            .max_fee_per_gas(self.max_fee_per_gas)
            .max_priority_fee_per_gas(self.max_priority_fee_per_gas)
            .chain_id(self.chain_id)
            .nonce(self.nonce)
            .into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLeg {
    pub kind: LegKind,
    pub signer: SignerRole,
    pub tx: UnsignedTransaction,
}

/// 有序交易集合，顺序即链上执行顺序
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionSet {
    legs: Vec<BundleLeg>,
}

impl TransactionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, leg: BundleLeg) {
        self.legs.push(leg);
    }

    pub fn legs(&self) -> &[BundleLeg] {
        &self.legs
    }

    pub fn position(&self, kind: LegKind) -> Option<usize> {
        self.legs.iter().position(|leg| leg.kind == kind)
    }

    /// 资金产生方必须排在消费方之前：fund-gas < release < forward
    pub fn is_ordered(&self) -> bool {
        let fund = self.position(LegKind::FundGas);
        let release = self.position(LegKind::Release);
        let forward = self.position(LegKind::Forward);
        let before = |a: Option<usize>, b: Option<usize>| match (a, b) {
            (Some(a), Some(b)) => a < b,
            _ => true,
        };
        before(fund, release) && before(fund, forward) && before(release, forward)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedLeg {
    pub kind: LegKind,
    pub signer: SignerRole,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub nonce: U256,
    pub hash: H256,
    pub raw: Bytes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedBundle {
    pub legs: Vec<SignedLeg>,
}

impl SignedBundle {
    pub fn raw_transactions(&self) -> Vec<Bytes> {
        self.legs.iter().map(|leg| leg.raw.clone()).collect()
    }

    pub fn hashes(&self) -> Vec<H256> {
        self.legs.iter().map(|leg| leg.hash).collect()
    }
}

/// 一次提交：已签名的交易集合 + 唯一替换令牌 + 目标区块
#[derive(Debug, Clone)]
pub struct BundleAttempt {
    pub attempt: u64,
    pub bundle: SignedBundle,
    pub replacement_token: Uuid,
    pub target_block: u64,
}
