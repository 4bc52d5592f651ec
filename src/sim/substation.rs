//! Substation topology, live state, and utilization thresholds.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::load_model::LoadProfile;

/// Utilization at which a substation enters `Warning`.
pub const WARNING_THRESHOLD: f64 = 0.85;
/// Utilization at which a substation enters `Critical`.
pub const CRITICAL_THRESHOLD: f64 = 0.95;
/// Utilization at which a substation enters `Overload` and starts a trip countdown.
pub const OVERLOAD_THRESHOLD: f64 = 1.05;

/// Planar position in kilometres on the simulated city grid.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x_km: f64,
    pub y_km: f64,
}

impl Position {
    pub fn new(x_km: f64, y_km: f64) -> Self {
        Self { x_km, y_km }
    }

    /// Straight-line distance to `other` in kilometres.
    pub fn distance_km(&self, other: &Position) -> f64 {
        (self.x_km - other.x_km).hypot(self.y_km - other.y_km)
    }
}

/// Operating status of a substation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Normal,
    Warning,
    Critical,
    Overload,
    Failed,
}

impl Status {
    /// Threshold bucket for a utilization fraction (never returns `Failed`).
    pub fn from_utilization(utilization: f64) -> Self {
        if utilization >= OVERLOAD_THRESHOLD {
            Self::Overload
        } else if utilization >= CRITICAL_THRESHOLD {
            Self::Critical
        } else if utilization >= WARNING_THRESHOLD {
            Self::Warning
        } else {
            Self::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Overload => "OVERLOAD",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static topology plus live state of one substation.
///
/// Created once from configuration and mutated in place every tick by
/// [`crate::sim::grid::GridStateMachine`], which owns the table.
#[derive(Debug, Clone)]
pub struct Substation {
    pub id: String,
    pub name: String,
    /// Rated apparent power (MVA).
    pub capacity_mva: f64,
    /// Power factor used to convert MVA to real-power capacity.
    pub power_factor: f64,
    /// Peak baseline demand (kW) scaled by the daily load curve.
    pub base_load_kw: f64,
    pub profile: LoadProfile,
    pub position: Position,
    /// Most recent demand (MW), recorded even while failed.
    pub current_load_mw: f64,
    pub status: Status,
    /// Simulated time at which a sustained overload trips the substation.
    pub trip_deadline: Option<Duration>,
    pub v2g_enabled: bool,
    /// Operator-pinned demand (MW) replacing the load model output.
    pub load_override_mw: Option<f64>,
}

impl Substation {
    /// Creates a substation in `Normal` status with no load.
    ///
    /// # Panics
    ///
    /// Panics if `capacity_mva` or `power_factor` is not positive.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        capacity_mva: f64,
        power_factor: f64,
        base_load_kw: f64,
        profile: LoadProfile,
        position: Position,
    ) -> Self {
        assert!(capacity_mva > 0.0);
        assert!(power_factor > 0.0 && power_factor <= 1.0);

        Self {
            id: id.into(),
            name: name.into(),
            capacity_mva,
            power_factor,
            base_load_kw: base_load_kw.max(0.0),
            profile,
            position,
            current_load_mw: 0.0,
            status: Status::Normal,
            trip_deadline: None,
            v2g_enabled: false,
            load_override_mw: None,
        }
    }

    /// Real-power capacity (MW).
    pub fn capacity_mw(&self) -> f64 {
        self.capacity_mva * self.power_factor
    }

    /// Current load as a fraction of real-power capacity, never negative.
    pub fn utilization(&self) -> f64 {
        (self.current_load_mw / self.capacity_mw()).max(0.0)
    }

    pub fn is_failed(&self) -> bool {
        self.status == Status::Failed
    }

    /// Time left before the trip countdown elapses, if one is running.
    pub fn countdown_remaining(&self, now: Duration) -> Option<Duration> {
        self.trip_deadline
            .map(|deadline| deadline.saturating_sub(now))
    }
}
