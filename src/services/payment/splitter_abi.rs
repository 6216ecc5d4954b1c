// services/payment/splitter_abi.rs
//
// PaymentSplitter 的最小 ABI 面：release + 四个只读查询

use crate::errors::error::AppError;
use ethers_core::abi::{self, ParamType, Token};
use ethers_core::types::{Address, Bytes, U256};
use ethers_core::utils::id;

pub const RELEASE: &str = "release(address)";
pub const TOTAL_RELEASED: &str = "totalReleased()";
pub const TOTAL_SHARES: &str = "totalShares()";
pub const SHARES: &str = "shares(address)";
pub const RELEASED: &str = "released(address)";

fn encode_call(signature: &str, args: &[Token]) -> Bytes {
    let mut data = Vec::with_capacity(4 + 32 * args.len());
    data.extend_from_slice(&id(signature));
    data.extend_from_slice(&abi::encode(args));
    data.into()
}

pub fn release_call(account: Address) -> Bytes {
    encode_call(RELEASE, &[Token::Address(account)])
}

pub fn total_released_call() -> Bytes {
    encode_call(TOTAL_RELEASED, &[])
}

pub fn total_shares_call() -> Bytes {
    encode_call(TOTAL_SHARES, &[])
}

pub fn shares_call(account: Address) -> Bytes {
    encode_call(SHARES, &[Token::Address(account)])
}

pub fn released_call(account: Address) -> Bytes {
    encode_call(RELEASED, &[Token::Address(account)])
}

pub fn decode_uint(output: &[u8]) -> Result<U256, AppError> {
    let tokens = abi::decode(&[ParamType::Uint(256)], output)?;
    match tokens.into_iter().next() {
        Some(Token::Uint(value)) => Ok(value),
        other => Err(AppError::Abi(format!("expected uint256, got {:?}", other))),
    }
}
