//! Core simulation types: timing configuration, status views, and snapshots.

use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

use super::arbiter::ScenarioLock;
use super::cascade::{CascadeProgress, CascadeView};
use super::power_flow::PowerFlowReport;
use super::substation::{Status, Substation};
use super::v2g::{SessionStatus, V2gSession};

pub(crate) fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

pub(crate) fn serialize_opt_secs<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&d.as_secs_f64()),
        None => s.serialize_none(),
    }
}

/// Centralized timing configuration for the engine.
///
/// # Examples
///
/// ```
/// use grid_sim::sim::types::SimConfig;
///
/// let cfg = SimConfig::new(1.0, 120, 42);
/// assert_eq!(cfg.tick.as_secs(), 1);
/// assert_eq!(cfg.total_duration().as_secs(), 120);
/// ```
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Simulated duration of one tick.
    pub tick: Duration,
    /// Number of ticks a batch run executes.
    pub ticks: u64,
    /// Sustained-overload window before a trip.
    pub trip_window: Duration,
    /// Simulated hours of day advanced per simulated hour; 0 freezes the time of day.
    pub time_of_day_rate: f64,
    /// Master random seed for reproducibility.
    pub seed: u64,
}

impl SimConfig {
    /// Creates a configuration with the default trip window and a real-time day.
    ///
    /// # Arguments
    ///
    /// * `tick_seconds` - Simulated seconds per tick (must be > 0)
    /// * `ticks` - Number of ticks for batch runs
    /// * `seed` - Master random seed
    ///
    /// # Panics
    ///
    /// Panics if `tick_seconds` is not a positive finite number.
    pub fn new(tick_seconds: f64, ticks: u64, seed: u64) -> Self {
        assert!(
            tick_seconds.is_finite() && tick_seconds > 0.0,
            "tick_seconds must be > 0"
        );
        Self {
            tick: Duration::from_secs_f64(tick_seconds),
            ticks,
            trip_window: super::grid::DEFAULT_TRIP_WINDOW,
            time_of_day_rate: 1.0,
            seed,
        }
    }

    pub fn with_trip_window(mut self, window: Duration) -> Self {
        self.trip_window = window;
        self
    }

    pub fn with_time_of_day_rate(mut self, rate: f64) -> Self {
        self.time_of_day_rate = rate.max(0.0);
        self
    }

    /// Simulated time covered by a full batch run.
    pub fn total_duration(&self) -> Duration {
        self.tick.saturating_mul(self.ticks.min(u32::MAX as u64) as u32)
    }
}

/// Answer to `GetStatus`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubstationStatus {
    pub id: String,
    pub utilization: f64,
    pub status: Status,
    pub countdown_remaining_s: Option<f64>,
}

impl SubstationStatus {
    pub fn of(sub: &Substation, now: Duration) -> Self {
        Self {
            id: sub.id.clone(),
            utilization: sub.utilization(),
            status: sub.status,
            countdown_remaining_s: sub.countdown_remaining(now).map(|d| d.as_secs_f64()),
        }
    }
}

/// Full per-substation row of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubstationView {
    pub id: String,
    pub name: String,
    pub status: Status,
    pub load_mw: f64,
    pub capacity_mw: f64,
    pub utilization: f64,
    pub countdown_remaining_s: Option<f64>,
    pub v2g_enabled: bool,
    pub load_override_mw: Option<f64>,
}

impl SubstationView {
    pub fn of(sub: &Substation, now: Duration) -> Self {
        Self {
            id: sub.id.clone(),
            name: sub.name.clone(),
            status: sub.status,
            load_mw: sub.current_load_mw,
            capacity_mw: sub.capacity_mw(),
            utilization: sub.utilization(),
            countdown_remaining_s: sub.countdown_remaining(now).map(|d| d.as_secs_f64()),
            v2g_enabled: sub.v2g_enabled,
            load_override_mw: sub.load_override_mw,
        }
    }
}

/// Something notable that happened during one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TickEvent {
    StatusChanged {
        substation_id: String,
        from: Status,
        to: Status,
    },
    /// Sustained overload forced the substation into `Failed`.
    Tripped { substation_id: String },
    Cascade { progress: CascadeProgress },
    SessionEnded {
        substation_id: String,
        status: SessionStatus,
        delivered_kwh: f64,
        revenue: f64,
    },
    /// A met V2G target brought the substation back.
    AutoRestored { substation_id: String, status: Status },
    LockReleased { scenario_id: String },
}

/// Full grid state after a tick, for rendering and reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridSnapshot {
    pub tick: u64,
    pub time_s: f64,
    pub hour: u8,
    pub fractional_hour: f64,
    pub temperature_f: f64,
    pub active_scenario: Option<ScenarioLock>,
    pub substations: Vec<SubstationView>,
    pub sessions: Vec<V2gSession>,
    pub cascade: Option<CascadeView>,
    pub power_flow: Option<PowerFlowReport>,
    pub total_load_mw: f64,
    pub events: Vec<TickEvent>,
}

impl GridSnapshot {
    /// Number of substations currently in `status`.
    pub fn count(&self, status: Status) -> usize {
        self.substations.iter().filter(|s| s.status == status).count()
    }

    pub fn substation(&self, id: &str) -> Option<&SubstationView> {
        self.substations.iter().find(|s| s.id == id)
    }
}

impl fmt::Display for GridSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let peak = self
            .substations
            .iter()
            .map(|s| s.utilization)
            .fold(0.0_f64, f64::max);
        write!(
            f,
            "t={:>5} ({:>7.0}s {:>5.2}h {:>5.1}F) | load={:>8.1} MW peak={:>5.1}% | \
             N/W/C/O/F={}/{}/{}/{}/{} | v2g={} | scenario={}",
            self.tick,
            self.time_s,
            self.fractional_hour,
            self.temperature_f,
            self.total_load_mw,
            peak * 100.0,
            self.count(Status::Normal),
            self.count(Status::Warning),
            self.count(Status::Critical),
            self.count(Status::Overload),
            self.count(Status::Failed),
            self.sessions.len(),
            self.active_scenario
                .as_ref()
                .map(|l| l.owner.as_str())
                .unwrap_or("-"),
        )
    }
}
