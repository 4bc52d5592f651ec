//! Vehicle feed collaborators: the traffic side of the co-simulation.

/// Fixed vehicle list for drills and tests.
pub mod fixed;
/// Seeded random-walk traffic model.
pub mod synthetic;
pub mod types;

pub use fixed::StaticFleet;
pub use synthetic::{FleetParams, SyntheticFleet};
pub use types::{Discharge, VehicleAsset, VehicleFeed};
