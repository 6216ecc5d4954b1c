pub mod bundle;
pub mod payment;
pub mod rescue_service;
pub mod tx;

pub use rescue_service::{RescueService, RescueSettings, RunSummary};
