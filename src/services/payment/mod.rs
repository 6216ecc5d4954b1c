pub mod payment_calculator;
pub mod splitter_abi;

pub use payment_calculator::{PaymentCalculator, SplitterState};
