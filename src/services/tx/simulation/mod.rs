pub mod simulation_service;

pub use simulation_service::{SimulationService, SimulationVerdict};
