//! Common types and the feed trait for mobile battery assets.

use std::time::Duration;

use rand::{Rng, rngs::StdRng};
use serde::Serialize;

use crate::sim::substation::Position;

/// One vehicle as reported by the traffic collaborator for the current tick.
///
/// The simulation core never owns vehicle lifecycle; it reads these
/// snapshots and reports discharges back through [`VehicleFeed`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleAsset {
    pub id: String,
    /// Fraction of usable energy stored, in `[0, 1]`.
    pub state_of_charge: f64,
    pub capacity_kwh: f64,
    pub position: Position,
    /// `true` while the vehicle is plugged in and drawing grid power.
    pub charging: bool,
}

impl VehicleAsset {
    /// Creates a parked, non-charging vehicle. `state_of_charge` is clamped to `[0, 1]`.
    pub fn new(
        id: impl Into<String>,
        state_of_charge: f64,
        capacity_kwh: f64,
        position: Position,
    ) -> Self {
        Self {
            id: id.into(),
            state_of_charge: state_of_charge.clamp(0.0, 1.0),
            capacity_kwh: capacity_kwh.max(0.0),
            position,
            charging: false,
        }
    }

    pub fn with_charging(mut self, charging: bool) -> Self {
        self.charging = charging;
        self
    }

    /// Energy (kWh) available above `soc_floor`.
    pub fn energy_above_kwh(&self, soc_floor: f64) -> f64 {
        (self.state_of_charge - soc_floor).max(0.0) * self.capacity_kwh
    }
}

/// Energy drawn from one vehicle on one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Discharge {
    pub vehicle_id: String,
    pub energy_kwh: f64,
}

/// Interface to the external traffic collaborator.
pub trait VehicleFeed {
    /// Returns the state of every active vehicle as of simulated time `now`.
    ///
    /// No ordering is guaranteed.
    fn snapshot(&mut self, now: Duration) -> Vec<VehicleAsset>;

    /// Reports energy drawn by V2G sessions during the tick just evaluated.
    fn apply_discharge(&mut self, discharges: &[Discharge]);

    /// Returns a human-readable name for the feed implementation.
    fn feed_type(&self) -> &'static str;
}

/// Zero-mean Gaussian sample (Box-Muller).
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `std_dev` - Standard deviation of the noise
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}
