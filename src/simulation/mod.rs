//! Simulation (C7), Simulation Group (C8), and Scoring (C10).

pub mod group;
pub mod scoring;
pub mod simulation;

pub use group::SimulationGroup;
pub use simulation::{SimulationOutcome, StabilizationConfig};
