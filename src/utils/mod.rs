pub mod format;
pub mod logger;

pub use format::{to_ether, to_gwei};
