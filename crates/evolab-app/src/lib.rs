//! Headless driver for the evolab genetics core.

pub mod config_patch;
pub mod simulation;

pub use config_patch::{PatchError, apply_overrides, apply_patch};
pub use simulation::{RunSummary, Simulation, SpeciesSnapshot, TickSummary};
