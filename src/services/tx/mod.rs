pub mod gas;
pub mod nonce;
pub mod signer;
pub mod simulation;
