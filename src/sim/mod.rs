/// Scenario lock and gated time/temperature setters.
pub mod arbiter;
/// Scripted multi-substation failure sequences.
pub mod cascade;
/// Logical simulation clock.
pub mod clock;
pub mod engine;
/// Substation status state machine with trip countdowns.
pub mod grid;
pub mod kpi;
/// Substation demand model.
pub mod load_model;
pub mod power_flow;
pub mod substation;
pub mod ticker;
pub mod types;
/// Emergency V2G dispatch.
pub mod v2g;
pub mod weather;

pub use engine::Simulation;
pub use ticker::{SharedSimulation, Ticker};
