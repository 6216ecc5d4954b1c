pub mod fee_oracle;
pub mod relay_client;
pub mod types;

pub use fee_oracle::{BlockPriceOracle, FeeOracle};
pub use relay_client::{BundleTransport, FlashbotsRelay, resolve_inclusion};
pub use types::{SimulationReport, SubmissionReceipt};
