//! TOML-based scenario configuration and preset definitions.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::GridError;
use crate::fleet::{FleetParams, SyntheticFleet};
use crate::sim::Simulation;
use crate::sim::load_model::{LoadParams, LoadProfile};
use crate::sim::power_flow::{AggregateLoadCheck, AggregateLoadParams};
use crate::sim::substation::{Position, Substation};
use crate::sim::types::SimConfig;
use crate::sim::v2g::V2gParams;
use crate::sim::weather::{MAX_TEMPERATURE_F, MIN_TEMPERATURE_F, TimeWeather};

/// Seed offset for the traffic model so it does not share a stream with other consumers.
const FLEET_SEED_OFFSET: u64 = 57;

/// Longest duration setting accepted, in seconds (one year).
const MAX_DURATION_S: f64 = 365.0 * 24.0 * 3600.0;

/// `true` for a finite, non-negative number of seconds no longer than a year.
fn is_duration_secs(secs: f64) -> bool {
    (0.0..=MAX_DURATION_S).contains(&secs)
}

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulation timing and initial conditions.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Grid state machine parameters.
    #[serde(default)]
    pub grid: GridConfig,
    /// Load model coefficients.
    #[serde(default)]
    pub load: LoadParams,
    /// V2G recruitment and pricing policy.
    #[serde(default)]
    pub v2g: V2gParams,
    /// Synthetic traffic model.
    #[serde(default)]
    pub fleet: FleetParams,
    /// Optional aggregate power-flow check run every tick.
    #[serde(default)]
    pub power_flow: Option<AggregateLoadParams>,
    /// Static topology.
    #[serde(default = "default_substations")]
    pub substations: Vec<SubstationConfig>,
    /// Scripted failure cascade.
    #[serde(default)]
    pub blackout: Option<BlackoutConfig>,
    /// Scripted V2G demonstration.
    #[serde(default)]
    pub v2g_demo: Option<V2gDemoConfig>,
}

/// Simulation timing and initial conditions.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Simulated seconds per tick (must be > 0).
    pub tick_seconds: f64,
    /// Number of ticks in a batch run.
    pub ticks: u64,
    /// Master random seed.
    pub seed: u64,
    /// Hour of day at start (0-23).
    pub start_hour: i64,
    /// Outdoor temperature at start (°F).
    pub start_temperature_f: f64,
    /// Time-of-day speed relative to simulated time; 0 freezes the clock face.
    pub time_of_day_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 1.0,
            ticks: 3600,
            seed: 42,
            start_hour: 14,
            start_temperature_f: 75.0,
            time_of_day_rate: 1.0,
        }
    }
}

/// Grid state machine parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// Sustained-overload window before a substation trips (s).
    pub trip_window_s: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            trip_window_s: 30.0,
        }
    }
}

/// One substation of the static topology.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubstationConfig {
    pub id: String,
    pub name: String,
    /// Rated apparent power (MVA).
    pub capacity_mva: f64,
    #[serde(default = "default_power_factor")]
    pub power_factor: f64,
    /// Peak baseline demand (kW).
    pub base_load_kw: f64,
    pub profile: LoadProfile,
    pub x_km: f64,
    pub y_km: f64,
}

fn default_power_factor() -> f64 {
    0.95
}

impl SubstationConfig {
    fn new(
        id: &str,
        name: &str,
        capacity_mva: f64,
        base_load_kw: f64,
        profile: LoadProfile,
        x_km: f64,
        y_km: f64,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            capacity_mva,
            power_factor: default_power_factor(),
            base_load_kw,
            profile,
            x_km,
            y_km,
        }
    }

    fn build(&self) -> Substation {
        Substation::new(
            self.id.clone(),
            self.name.clone(),
            self.capacity_mva,
            self.power_factor,
            self.base_load_kw,
            self.profile,
            Position::new(self.x_km, self.y_km),
        )
    }
}

fn default_substations() -> Vec<SubstationConfig> {
    use LoadProfile::*;
    vec![
        SubstationConfig::new("downtown", "Downtown", 600.0, 420_000.0, Commercial, 6.0, 6.0),
        SubstationConfig::new("harbor", "Harbor", 400.0, 250_000.0, Industrial, 2.0, 6.0),
        SubstationConfig::new("university", "University", 350.0, 210_000.0, Mixed, 6.0, 10.0),
        SubstationConfig::new("riverside", "Riverside", 300.0, 190_000.0, Residential, 10.0, 6.0),
        SubstationConfig::new("midtown", "Midtown", 450.0, 300_000.0, Mixed, 6.0, 3.0),
        SubstationConfig::new("northgate", "Northgate", 250.0, 150_000.0, Residential, 9.5, 10.0),
        SubstationConfig::new("eastside", "Eastside", 250.0, 160_000.0, Residential, 10.0, 2.0),
        SubstationConfig::new("medical", "Medical Center", 200.0, 120_000.0, Commercial, 2.5, 10.0),
    ]
}

/// Scripted failure cascade started at a given tick.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlackoutConfig {
    /// Substations to fail, in order.
    pub order: Vec<String>,
    /// Delay between consecutive failures (s).
    #[serde(default = "default_step_delay_s")]
    pub step_delay_s: f64,
    /// Substation the cascade skips.
    #[serde(default)]
    pub survivor: Option<String>,
    /// Ticks completed before the cascade starts (0 starts it before the first tick).
    #[serde(default)]
    pub start_tick: u64,
}

fn default_step_delay_s() -> f64 {
    30.0
}

/// Scripted V2G demonstration started at a given tick.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct V2gDemoConfig {
    pub substation: String,
    pub target_kwh: f64,
    /// Ticks completed before the demonstration starts.
    #[serde(default)]
    pub start_tick: u64,
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.tick_seconds"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

fn err(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError {
        field: field.into(),
        message: message.into(),
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self::baseline()
    }
}

impl ScenarioConfig {
    /// Returns the baseline scenario: a mild afternoon with no scripted events.
    pub fn baseline() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            grid: GridConfig::default(),
            load: LoadParams::default(),
            v2g: V2gParams::default(),
            fleet: FleetParams::default(),
            power_flow: Some(AggregateLoadParams::default()),
            substations: default_substations(),
            blackout: None,
            v2g_demo: None,
        }
    }

    /// Returns the heatwave preset: 104 °F late afternoon, heavy EV charging.
    pub fn heatwave() -> Self {
        Self {
            simulation: SimulationConfig {
                start_hour: 15,
                start_temperature_f: 104.0,
                ..SimulationConfig::default()
            },
            fleet: FleetParams {
                vehicles: 800,
                charging_probability: 0.35,
                ..FleetParams::default()
            },
            ..Self::baseline()
        }
    }

    /// Returns the blackout preset: a scripted cascade across the city that
    /// spares the medical center.
    pub fn blackout() -> Self {
        Self {
            simulation: SimulationConfig {
                ticks: 300,
                ..SimulationConfig::default()
            },
            blackout: Some(BlackoutConfig {
                order: [
                    "harbor",
                    "midtown",
                    "downtown",
                    "riverside",
                    "eastside",
                    "university",
                    "northgate",
                    "medical",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
                step_delay_s: 30.0,
                survivor: Some("medical".to_string()),
                start_tick: 10,
            }),
            ..Self::baseline()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "heatwave", "blackout"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "heatwave" => Ok(Self::heatwave()),
            "blackout" => Ok(Self::blackout()),
            _ => Err(err(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| err("scenario", format!("cannot read \"{}\": {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| err("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let s = &self.simulation;
        if !(s.tick_seconds > 0.0 && is_duration_secs(s.tick_seconds)) {
            errors.push(err("simulation.tick_seconds", "must be > 0 and at most one year"));
        }
        if !(0..=23).contains(&s.start_hour) {
            errors.push(err("simulation.start_hour", "must be in [0, 23]"));
        }
        if !(MIN_TEMPERATURE_F..=MAX_TEMPERATURE_F).contains(&s.start_temperature_f) {
            errors.push(err(
                "simulation.start_temperature_f",
                format!("must be in [{MIN_TEMPERATURE_F}, {MAX_TEMPERATURE_F}]"),
            ));
        }
        if !(s.time_of_day_rate.is_finite() && s.time_of_day_rate >= 0.0) {
            errors.push(err("simulation.time_of_day_rate", "must be >= 0"));
        }
        if !is_duration_secs(self.grid.trip_window_s) {
            errors.push(err("grid.trip_window_s", "must be >= 0 and at most one year"));
        }

        self.validate_substations(&mut errors);
        self.validate_v2g(&mut errors);
        self.validate_fleet(&mut errors);
        self.validate_scripts(&mut errors);
        errors
    }

    fn validate_substations(&self, errors: &mut Vec<ConfigError>) {
        if self.substations.is_empty() {
            errors.push(err("substations", "at least one substation is required"));
        }
        let mut seen = HashSet::new();
        for (i, sub) in self.substations.iter().enumerate() {
            let field = |name: &str| format!("substations[{i}].{name}");
            if !seen.insert(sub.id.as_str()) {
                errors.push(err(field("id"), format!("duplicate id \"{}\"", sub.id)));
            }
            if !(sub.capacity_mva.is_finite() && sub.capacity_mva > 0.0) {
                errors.push(err(field("capacity_mva"), "must be > 0"));
            }
            if !(sub.power_factor > 0.0 && sub.power_factor <= 1.0) {
                errors.push(err(field("power_factor"), "must be in (0.0, 1.0]"));
            }
            if !(sub.base_load_kw.is_finite() && sub.base_load_kw >= 0.0) {
                errors.push(err(field("base_load_kw"), "must be >= 0"));
            }
        }
    }

    fn validate_v2g(&self, errors: &mut Vec<ConfigError>) {
        let v = &self.v2g;
        if !(0.0..=1.0).contains(&v.recruit_soc_floor) {
            errors.push(err("v2g.recruit_soc_floor", "must be in [0.0, 1.0]"));
        }
        if !(0.0..=1.0).contains(&v.safety_soc_floor) || v.safety_soc_floor >= v.recruit_soc_floor {
            errors.push(err(
                "v2g.safety_soc_floor",
                "must be in [0.0, 1.0] and below v2g.recruit_soc_floor",
            ));
        }
        if !(v.service_radius_km.is_finite() && v.service_radius_km > 0.0) {
            errors.push(err("v2g.service_radius_km", "must be a finite value > 0"));
        }
        if !(v.discharge_kw.is_finite() && v.discharge_kw > 0.0) {
            errors.push(err("v2g.discharge_kw", "must be a finite value > 0"));
        }
        if !is_duration_secs(v.recruitment_timeout_s) {
            errors.push(err("v2g.recruitment_timeout_s", "must be >= 0 and at most one year"));
        }
        if !is_duration_secs(v.target_duration_s) {
            errors.push(err("v2g.target_duration_s", "must be >= 0 and at most one year"));
        }
        if !(v.market_price_per_kwh.is_finite() && v.market_price_per_kwh >= 0.0) {
            errors.push(err("v2g.market_price_per_kwh", "must be a finite value >= 0"));
        }
        if !(v.urgency_gain.is_finite() && v.urgency_gain >= 0.0) {
            errors.push(err("v2g.urgency_gain", "must be a finite value >= 0"));
        }
        if !(v.max_price_multiplier.is_finite() && v.max_price_multiplier >= 1.0) {
            errors.push(err("v2g.max_price_multiplier", "must be a finite value >= 1"));
        }
    }

    fn validate_fleet(&self, errors: &mut Vec<ConfigError>) {
        let f = &self.fleet;
        if !(f.capacity_kwh_min > 0.0) {
            errors.push(err("fleet.capacity_kwh_min", "must be > 0"));
        }
        if f.capacity_kwh_max < f.capacity_kwh_min {
            errors.push(err("fleet.capacity_kwh_max", "must be >= fleet.capacity_kwh_min"));
        }
        if !(0.0..=1.0).contains(&f.initial_soc_min)
            || !(0.0..=1.0).contains(&f.initial_soc_max)
            || f.initial_soc_max < f.initial_soc_min
        {
            errors.push(err(
                "fleet.initial_soc_min",
                "SOC bounds must be in [0.0, 1.0] with min <= max",
            ));
        }
        if !(0.0..=1.0).contains(&f.charging_probability) {
            errors.push(err("fleet.charging_probability", "must be in [0.0, 1.0]"));
        }
        if !(f.area_width_km > 0.0 && f.area_height_km > 0.0) {
            errors.push(err("fleet.area_width_km", "area extents must be > 0"));
        }
    }

    fn validate_scripts(&self, errors: &mut Vec<ConfigError>) {
        let known: HashSet<&str> = self.substations.iter().map(|s| s.id.as_str()).collect();
        if let Some(b) = &self.blackout {
            if b.order.is_empty() {
                errors.push(err("blackout.order", "must not be empty"));
            }
            for id in b.order.iter().chain(b.survivor.iter()) {
                if !known.contains(id.as_str()) {
                    errors.push(err("blackout.order", format!("unknown substation \"{id}\"")));
                }
            }
            if !is_duration_secs(b.step_delay_s) {
                errors.push(err("blackout.step_delay_s", "must be >= 0 and at most one year"));
            }
        }
        if let Some(d) = &self.v2g_demo {
            if !known.contains(d.substation.as_str()) {
                errors.push(err(
                    "v2g_demo.substation",
                    format!("unknown substation \"{}\"", d.substation),
                ));
            }
            if !(d.target_kwh.is_finite() && d.target_kwh > 0.0) {
                errors.push(err("v2g_demo.target_kwh", "must be > 0"));
            }
        }
    }

    /// Timing configuration derived from `[simulation]` and `[grid]`.
    ///
    /// # Panics
    ///
    /// Panics if `simulation.tick_seconds` is not positive; call
    /// [`ScenarioConfig::validate`] first.
    pub fn sim_config(&self) -> SimConfig {
        let s = &self.simulation;
        SimConfig::new(s.tick_seconds, s.ticks, s.seed)
            .with_trip_window(Duration::from_secs_f64(self.grid.trip_window_s.max(0.0)))
            .with_time_of_day_rate(s.time_of_day_rate)
    }

    /// Builds a simulation with a synthetic traffic feed.
    ///
    /// # Panics
    ///
    /// Panics on invalid configuration; call [`ScenarioConfig::validate`] first.
    pub fn build(&self) -> Simulation {
        let fleet = SyntheticFleet::new(
            self.fleet.clone(),
            self.simulation.seed.wrapping_add(FLEET_SEED_OFFSET),
        );
        let substations = self.substations.iter().map(SubstationConfig::build).collect();
        let sim = Simulation::new(self.sim_config(), substations, Box::new(fleet))
            .with_weather(TimeWeather::new(
                self.simulation.start_hour,
                self.simulation.start_temperature_f,
            ))
            .with_load_params(self.load.clone())
            .with_v2g_params(self.v2g.clone());
        match &self.power_flow {
            Some(params) => sim.with_validator(Box::new(AggregateLoadCheck::new(params.clone()))),
            None => sim,
        }
    }

    /// Issues the scripted commands due once `completed_ticks` ticks have run.
    ///
    /// # Returns
    ///
    /// The errors of rejected commands. They are logged and do not stop the run.
    pub fn apply_scheduled(&self, sim: &mut Simulation, completed_ticks: u64) -> Vec<GridError> {
        let mut rejected = Vec::new();
        if let Some(b) = self.blackout.as_ref().filter(|b| b.start_tick == completed_ticks) {
            let delay = Duration::from_secs_f64(b.step_delay_s.max(0.0));
            match sim.start_cascade(b.order.clone(), delay, b.survivor.clone()) {
                Ok(()) => info!(tick = completed_ticks, "scripted blackout started"),
                Err(e) => {
                    warn!(tick = completed_ticks, error = %e, "scripted blackout rejected");
                    rejected.push(e);
                }
            }
        }
        if let Some(d) = self.v2g_demo.as_ref().filter(|d| d.start_tick == completed_ticks) {
            match sim.run_v2g_demo(&d.substation, d.target_kwh) {
                Ok(()) => info!(
                    tick = completed_ticks,
                    substation = %d.substation,
                    "scripted V2G demo started"
                ),
                Err(e) => {
                    warn!(tick = completed_ticks, error = %e, "scripted V2G demo rejected");
                    rejected.push(e);
                }
            }
        }
        rejected
    }
}
