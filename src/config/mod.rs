pub mod config;

pub use config::{
    AccountsConfig, BundleConfig, Config, EthereumConfig, PriorityFeeConfig, RelayConfig,
    ReleaseSigner, RunConfig, RunMode, SplitterConfig, GWEI,
};
