pub mod provider;
pub mod relay;
