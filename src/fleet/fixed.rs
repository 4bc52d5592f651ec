use std::time::Duration;

use super::types::{Discharge, VehicleAsset, VehicleFeed};

/// A feed with a fixed vehicle list that never moves or charges.
///
/// Discharges are applied to the stored state of charge, so later
/// snapshots reflect energy already drawn. Useful for drills and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticFleet {
    vehicles: Vec<VehicleAsset>,
}

impl StaticFleet {
    pub fn new(vehicles: Vec<VehicleAsset>) -> Self {
        Self { vehicles }
    }

    pub fn vehicles(&self) -> &[VehicleAsset] {
        &self.vehicles
    }

    /// Drops a vehicle from the feed, as if it left the simulated area.
    pub fn remove(&mut self, id: &str) -> Option<VehicleAsset> {
        let idx = self.vehicles.iter().position(|v| v.id == id)?;
        Some(self.vehicles.remove(idx))
    }
}

impl VehicleFeed for StaticFleet {
    fn snapshot(&mut self, _now: Duration) -> Vec<VehicleAsset> {
        self.vehicles.clone()
    }

    fn apply_discharge(&mut self, discharges: &[Discharge]) {
        for d in discharges {
            let Some(v) = self.vehicles.iter_mut().find(|v| v.id == d.vehicle_id) else {
                continue;
            };
            if v.capacity_kwh > 0.0 {
                v.state_of_charge = (v.state_of_charge - d.energy_kwh / v.capacity_kwh).max(0.0);
            }
        }
    }

    fn feed_type(&self) -> &'static str {
        "StaticFleet"
    }
}
