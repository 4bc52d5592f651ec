//! City-scale power-grid co-simulation with V2G emergency dispatch.

/// REST command and snapshot surface over a shared simulation.
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod error;
/// Vehicle feed collaborators.
pub mod fleet;
pub mod io;
pub mod logging;
/// Simulation engine, grid state machine, cascade, and V2G modules.
pub mod sim;
