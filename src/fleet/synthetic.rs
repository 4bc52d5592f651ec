use std::collections::HashSet;
use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use super::types::{Discharge, VehicleAsset, VehicleFeed, gaussian_noise};
use crate::sim::substation::Position;

/// Parameters of the built-in synthetic traffic model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FleetParams {
    /// Number of vehicles in the city.
    pub vehicles: usize,
    pub capacity_kwh_min: f64,
    pub capacity_kwh_max: f64,
    pub initial_soc_min: f64,
    pub initial_soc_max: f64,
    /// Probability a vehicle starts the run plugged in.
    pub charging_probability: f64,
    /// Chance per simulated hour that a driving vehicle plugs in.
    pub plug_in_rate_per_h: f64,
    /// State of charge below which a driving vehicle always plugs in.
    pub low_soc_threshold: f64,
    pub charge_kw: f64,
    pub area_width_km: f64,
    pub area_height_km: f64,
    /// Typical driving speed, the scale of the random walk.
    pub speed_kmh: f64,
    pub drive_kwh_per_km: f64,
}

impl Default for FleetParams {
    fn default() -> Self {
        Self {
            vehicles: 400,
            capacity_kwh_min: 55.0,
            capacity_kwh_max: 100.0,
            initial_soc_min: 0.3,
            initial_soc_max: 1.0,
            charging_probability: 0.2,
            plug_in_rate_per_h: 0.25,
            low_soc_threshold: 0.15,
            charge_kw: 7.2,
            area_width_km: 12.0,
            area_height_km: 12.0,
            speed_kmh: 25.0,
            drive_kwh_per_km: 0.18,
        }
    }
}

/// Seeded random-walk traffic model standing in for the traffic collaborator.
///
/// Driving vehicles wander inside the city rectangle and drain their
/// battery with distance; plugged-in vehicles stay put and charge until full.
/// Vehicles discharged by V2G on a tick are held in place on the next one.
///
/// Identical seeds and parameters produce identical snapshot sequences.
#[derive(Debug, Clone)]
pub struct SyntheticFleet {
    params: FleetParams,
    vehicles: Vec<VehicleAsset>,
    held: HashSet<String>,
    last_polled: Duration,
    rng: StdRng,
}

impl SyntheticFleet {
    /// Spawns `params.vehicles` vehicles at random positions.
    ///
    /// # Panics
    ///
    /// Panics if the capacity or SOC ranges are inverted or the area is empty.
    pub fn new(params: FleetParams, seed: u64) -> Self {
        assert!(params.capacity_kwh_min > 0.0);
        assert!(params.capacity_kwh_max >= params.capacity_kwh_min);
        assert!((0.0..=1.0).contains(&params.initial_soc_min));
        assert!(params.initial_soc_max >= params.initial_soc_min && params.initial_soc_max <= 1.0);
        assert!(params.area_width_km > 0.0 && params.area_height_km > 0.0);

        let mut rng = StdRng::seed_from_u64(seed);
        let vehicles = (0..params.vehicles)
            .map(|i| {
                let capacity = rng.random_range(params.capacity_kwh_min..=params.capacity_kwh_max);
                let soc = rng.random_range(params.initial_soc_min..=params.initial_soc_max);
                let position = Position::new(
                    rng.random_range(0.0..=params.area_width_km),
                    rng.random_range(0.0..=params.area_height_km),
                );
                let charging = rng.random_bool(params.charging_probability.clamp(0.0, 1.0));
                VehicleAsset::new(format!("ev-{i:04}"), soc, capacity, position).with_charging(charging)
            })
            .collect();

        Self {
            params,
            vehicles,
            held: HashSet::new(),
            last_polled: Duration::ZERO,
            rng,
        }
    }

    pub fn params(&self) -> &FleetParams {
        &self.params
    }

    pub fn vehicles(&self) -> &[VehicleAsset] {
        &self.vehicles
    }

    fn step(&mut self, dt_hours: f64) {
        let p = &self.params;
        let step_km = p.speed_kmh * dt_hours / std::f64::consts::SQRT_2;
        let plug_in = (p.plug_in_rate_per_h * dt_hours).clamp(0.0, 1.0);

        for v in &mut self.vehicles {
            if self.held.contains(&v.id) {
                continue;
            }
            if v.charging {
                v.state_of_charge += p.charge_kw * dt_hours / v.capacity_kwh;
                if v.state_of_charge >= 1.0 {
                    v.state_of_charge = 1.0;
                    v.charging = false;
                }
                continue;
            }

            let from = v.position;
            v.position.x_km = (v.position.x_km + gaussian_noise(&mut self.rng, step_km))
                .clamp(0.0, p.area_width_km);
            v.position.y_km = (v.position.y_km + gaussian_noise(&mut self.rng, step_km))
                .clamp(0.0, p.area_height_km);
            let driven_km = from.distance_km(&v.position);
            v.state_of_charge =
                (v.state_of_charge - driven_km * p.drive_kwh_per_km / v.capacity_kwh).max(0.0);

            if v.state_of_charge < p.low_soc_threshold || self.rng.random_bool(plug_in) {
                v.charging = true;
            }
        }
        self.held.clear();
    }
}

impl VehicleFeed for SyntheticFleet {
    fn snapshot(&mut self, now: Duration) -> Vec<VehicleAsset> {
        let dt_hours = now.saturating_sub(self.last_polled).as_secs_f64() / 3600.0;
        self.last_polled = now;
        if dt_hours > 0.0 {
            self.step(dt_hours);
        }
        self.vehicles.clone()
    }

    fn apply_discharge(&mut self, discharges: &[Discharge]) {
        for d in discharges {
            let Some(v) = self.vehicles.iter_mut().find(|v| v.id == d.vehicle_id) else {
                continue;
            };
            v.state_of_charge = (v.state_of_charge - d.energy_kwh / v.capacity_kwh).max(0.0);
            v.charging = false;
            self.held.insert(v.id.clone());
        }
    }

    fn feed_type(&self) -> &'static str {
        "SyntheticFleet"
    }
}
