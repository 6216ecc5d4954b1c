pub mod ethereum_provider;
mod retry_adapter;

pub use ethereum_provider::{EthereumProvider, LedgerReader};
pub use retry_adapter::RetryAdapter;
