//! Interface to the electrical power-flow collaborator.
//!
//! Validation here is diagnostic only. Failure detection in the grid state
//! machine is aggregate-load based and never consults these reports.

use serde::{Deserialize, Serialize};

/// Load at one substation bus for the tick being validated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusLoad {
    pub substation_id: String,
    pub load_mw: f64,
    pub capacity_mw: f64,
    /// Failed substations carry no flow.
    pub energized: bool,
}

/// Per-bus diagnostic returned by a validator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusVoltage {
    pub substation_id: String,
    pub voltage_pu: f64,
    pub within_limits: bool,
}

/// Feasibility and voltage diagnostics for one aggregate load vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerFlowReport {
    pub feasible: bool,
    pub total_load_mw: f64,
    pub buses: Vec<BusVoltage>,
}

impl PowerFlowReport {
    /// Lowest bus voltage among energized buses, if any.
    pub fn min_voltage_pu(&self) -> Option<f64> {
        self.buses.iter().map(|b| b.voltage_pu).reduce(f64::min)
    }
}

/// Accepts the aggregate load vector and returns feasibility diagnostics.
pub trait PowerFlowValidator {
    fn validate(&self, buses: &[BusLoad]) -> PowerFlowReport;

    /// Returns a human-readable name for the validator.
    fn validator_type(&self) -> &'static str;
}

/// Parameters of [`AggregateLoadCheck`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AggregateLoadParams {
    /// Voltage drop (p.u.) per unit of utilization.
    pub droop_pu: f64,
    /// Lowest acceptable bus voltage (p.u.).
    pub min_voltage_pu: f64,
}

impl Default for AggregateLoadParams {
    fn default() -> Self {
        Self {
            droop_pu: 0.05,
            min_voltage_pu: 0.95,
        }
    }
}

/// Linear voltage-drop estimate per bus: `v = 1 - droop * utilization`.
///
/// A crude stand-in for a real AC solver, good enough to flag buses pushed
/// far past rating.
///
/// # Examples
///
/// ```
/// use grid_sim::sim::power_flow::{AggregateLoadCheck, AggregateLoadParams, BusLoad, PowerFlowValidator};
///
/// let check = AggregateLoadCheck::new(AggregateLoadParams::default());
/// let report = check.validate(&[BusLoad {
///     substation_id: "s1".into(),
///     load_mw: 50.0,
///     capacity_mw: 100.0,
///     energized: true,
/// }]);
/// assert!(report.feasible);
/// assert!((report.buses[0].voltage_pu - 0.975).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Default)]
pub struct AggregateLoadCheck {
    params: AggregateLoadParams,
}

impl AggregateLoadCheck {
    pub fn new(params: AggregateLoadParams) -> Self {
        Self { params }
    }
}

impl PowerFlowValidator for AggregateLoadCheck {
    fn validate(&self, buses: &[BusLoad]) -> PowerFlowReport {
        let total_load_mw: f64 = buses.iter().filter(|b| b.energized).map(|b| b.load_mw).sum();
        let buses: Vec<BusVoltage> = buses
            .iter()
            .filter(|b| b.energized)
            .map(|b| {
                let utilization = if b.capacity_mw > 0.0 {
                    (b.load_mw / b.capacity_mw).max(0.0)
                } else {
                    0.0
                };
                let voltage_pu = 1.0 - self.params.droop_pu * utilization;
                BusVoltage {
                    substation_id: b.substation_id.clone(),
                    voltage_pu,
                    within_limits: voltage_pu >= self.params.min_voltage_pu,
                }
            })
            .collect();

        PowerFlowReport {
            feasible: buses.iter().all(|b| b.within_limits),
            total_load_mw,
            buses,
        }
    }

    fn validator_type(&self) -> &'static str {
        "AggregateLoadCheck"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus(id: &str, load_mw: f64, energized: bool) -> BusLoad {
        BusLoad {
            substation_id: id.into(),
            load_mw,
            capacity_mw: 100.0,
            energized,
        }
    }

    #[test]
    fn heavy_load_is_infeasible() {
        let check = AggregateLoadCheck::default();
        let report = check.validate(&[bus("a", 50.0, true), bus("b", 120.0, true)]);
        assert!(!report.feasible);
        assert!(report.buses[0].within_limits);
        assert!(!report.buses[1].within_limits);
        assert_eq!(report.min_voltage_pu(), Some(1.0 - 0.05 * 1.2));
    }

    #[test]
    fn failed_buses_are_ignored() {
        let check = AggregateLoadCheck::default();
        let report = check.validate(&[bus("a", 500.0, false)]);
        assert!(report.feasible);
        assert!(report.buses.is_empty());
        assert_eq!(report.min_voltage_pu(), None);
    }
}
