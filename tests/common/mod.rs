//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use grid_sim::fleet::{StaticFleet, VehicleAsset};
use grid_sim::sim::Simulation;
use grid_sim::sim::load_model::LoadProfile;
use grid_sim::sim::substation::{Position, Substation};
use grid_sim::sim::types::SimConfig;
use grid_sim::sim::v2g::V2gParams;

/// 51.6 kW over a 300 s tick delivers 4.3 kWh per vehicle.
pub const V2G_TICK_SECONDS: f64 = 300.0;

/// A substation at `(x_km, 0)` with power factor 1.0, so MW capacity equals MVA.
pub fn substation(id: &str, capacity_mva: f64, base_load_kw: f64, x_km: f64) -> Substation {
    Substation::new(
        id,
        id.to_uppercase(),
        capacity_mva,
        1.0,
        base_load_kw,
        LoadProfile::Mixed,
        Position::new(x_km, 0.0),
    )
}

/// Three lightly loaded substations 5 km apart: `north`, `central`, `south`.
pub fn three_substations() -> Vec<Substation> {
    vec![
        substation("north", 100.0, 20_000.0, 0.0),
        substation("central", 100.0, 20_000.0, 5.0),
        substation("south", 100.0, 20_000.0, 10.0),
    ]
}

/// `n` idle vehicles at `soc`, parked 0.5 km from the origin.
pub fn parked_vehicles(n: usize, soc: f64) -> Vec<VehicleAsset> {
    (0..n)
        .map(|i| VehicleAsset::new(format!("ev{i:03}"), soc, 60.0, Position::new(0.5, 0.0)))
        .collect()
}

/// 1 s ticks over three substations with no vehicles.
pub fn simple_sim() -> Simulation {
    Simulation::new(
        SimConfig::new(1.0, 120, 42),
        three_substations(),
        Box::new(StaticFleet::default()),
    )
}

/// 300 s ticks, 51.6 kW per vehicle, `vehicles` parked next to `north`.
pub fn v2g_sim(vehicles: Vec<VehicleAsset>) -> Simulation {
    Simulation::new(
        SimConfig::new(V2G_TICK_SECONDS, 12, 42),
        three_substations(),
        Box::new(StaticFleet::new(vehicles)),
    )
    .with_v2g_params(V2gParams {
        discharge_kw: 51.6,
        ..V2gParams::default()
    })
}
