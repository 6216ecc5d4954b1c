pub mod gas_service;
pub mod gas_strategy;

pub use gas_service::{FeeParams, GasService, fee_params, max_base_fee_in_future_block};
pub use gas_strategy::{PriorityFeePolicy, gwei_to_wei};
