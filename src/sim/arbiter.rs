//! Mutual exclusion between scenarios and manual time/temperature edits.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use super::types::serialize_secs;
use super::weather::TimeWeather;
use crate::error::{GridError, Result};

/// Kind of scenario holding the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    /// Scripted multi-substation failure sequence.
    BlackoutCascade,
    /// Explicit V2G demonstration run.
    V2gDemo,
    /// Operator drill; blocks other scenarios but not time/temperature edits.
    Drill,
}

impl ScenarioKind {
    /// Protected scenarios freeze time and temperature while they run.
    pub fn is_protected(&self) -> bool {
        matches!(self, Self::BlackoutCascade | Self::V2gDemo)
    }
}

/// The single system-wide scenario lock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioLock {
    pub owner: String,
    pub kind: ScenarioKind,
    #[serde(rename = "acquired_at_s", serialize_with = "serialize_secs")]
    pub acquired_at: Duration,
}

/// Gate owning the scenario lock and the time/weather state it protects.
///
/// Time and temperature can only be changed through the setters here, which
/// refuse while a protected scenario runs and clamp otherwise.
#[derive(Debug, Clone)]
pub struct ScenarioArbiter {
    lock: Option<ScenarioLock>,
    weather: TimeWeather,
}

impl ScenarioArbiter {
    pub fn new(weather: TimeWeather) -> Self {
        Self { lock: None, weather }
    }

    pub fn weather(&self) -> &TimeWeather {
        &self.weather
    }

    pub fn lock(&self) -> Option<&ScenarioLock> {
        self.lock.as_ref()
    }

    /// Id of the scenario holding the lock, if any.
    pub fn held_by(&self) -> Option<&str> {
        self.lock.as_ref().map(|l| l.owner.as_str())
    }

    /// Takes the lock for `scenario_id`.
    ///
    /// # Errors
    ///
    /// `ConflictActiveScenario` naming the holder if the lock is taken,
    /// including by the same scenario id.
    pub fn acquire(&mut self, scenario_id: &str, kind: ScenarioKind, now: Duration) -> Result<()> {
        if let Some(lock) = &self.lock {
            debug!(requested = scenario_id, held_by = %lock.owner, "scenario lock busy");
            return Err(GridError::ConflictActiveScenario {
                held_by: lock.owner.clone(),
            });
        }
        info!(scenario = scenario_id, ?kind, "scenario lock acquired");
        self.lock = Some(ScenarioLock {
            owner: scenario_id.to_string(),
            kind,
            acquired_at: now,
        });
        Ok(())
    }

    /// Releases the lock held by `scenario_id`.
    ///
    /// # Errors
    ///
    /// `NotLockOwner` if `scenario_id` does not hold it.
    pub fn release(&mut self, scenario_id: &str) -> Result<()> {
        match &self.lock {
            Some(lock) if lock.owner == scenario_id => {
                info!(scenario = scenario_id, "scenario lock released");
                self.lock = None;
                Ok(())
            }
            other => Err(GridError::NotLockOwner {
                requested: scenario_id.to_string(),
                held_by: other.as_ref().map(|l| l.owner.clone()),
            }),
        }
    }

    fn check_unprotected(&self) -> Result<()> {
        match &self.lock {
            Some(lock) if lock.kind.is_protected() => Err(GridError::ConflictActiveScenario {
                held_by: lock.owner.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Sets the simulated hour, clamped to `[0, 23]`.
    ///
    /// # Returns
    ///
    /// The hour actually applied.
    ///
    /// # Errors
    ///
    /// `ConflictActiveScenario` while a protected scenario holds the lock;
    /// the state is left untouched.
    pub fn set_time(&mut self, hour: i64) -> Result<u8> {
        self.check_unprotected()?;
        self.weather.set_hour(hour);
        info!(hour = self.weather.hour(), "simulated time set");
        Ok(self.weather.hour())
    }

    /// Sets the outdoor temperature, clamped to the valid range.
    ///
    /// # Returns
    ///
    /// The temperature actually applied.
    ///
    /// # Errors
    ///
    /// `ConflictActiveScenario` while a protected scenario holds the lock.
    pub fn set_temperature(&mut self, temperature_f: f64) -> Result<f64> {
        self.check_unprotected()?;
        self.weather.set_temperature_f(temperature_f);
        info!(temperature_f = self.weather.temperature_f(), "temperature set");
        Ok(self.weather.temperature_f())
    }

    /// Advances the time of day; the ticker does this unconditionally.
    pub(crate) fn advance_time(&mut self, elapsed: Duration) {
        self.weather.advance(elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arbiter() -> ScenarioArbiter {
        ScenarioArbiter::new(TimeWeather::new(12, 75.0))
    }

    #[test]
    fn acquire_is_exclusive() {
        let mut a = arbiter();
        assert!(a.acquire("blackout_cascade", ScenarioKind::BlackoutCascade, Duration::ZERO).is_ok());
        assert_eq!(
            a.acquire("v2g_demo", ScenarioKind::V2gDemo, Duration::ZERO),
            Err(GridError::ConflictActiveScenario {
                held_by: "blackout_cascade".into()
            })
        );
        assert_eq!(a.held_by(), Some("blackout_cascade"));
    }

    #[test]
    fn release_requires_owner() {
        let mut a = arbiter();
        a.acquire("x", ScenarioKind::Drill, Duration::ZERO).ok();
        assert!(matches!(a.release("y"), Err(GridError::NotLockOwner { .. })));
        assert!(a.release("x").is_ok());
        assert!(a.held_by().is_none());
        assert!(matches!(
            a.release("x"),
            Err(GridError::NotLockOwner { held_by: None, .. })
        ));
    }

    #[test]
    fn protected_lock_blocks_time_and_temperature() {
        let mut a = arbiter();
        a.acquire("blackout_cascade", ScenarioKind::BlackoutCascade, Duration::ZERO)
            .ok();
        let before = a.weather().clone();
        assert!(matches!(
            a.set_time(8),
            Err(GridError::ConflictActiveScenario { .. })
        ));
        assert!(a.set_temperature(100.0).is_err());
        assert_eq!(a.weather(), &before);
    }

    #[test]
    fn drill_lock_does_not_block_edits() {
        let mut a = arbiter();
        a.acquire("drill", ScenarioKind::Drill, Duration::ZERO).ok();
        assert_eq!(a.set_time(8), Ok(8));
    }

    #[test]
    fn setters_clamp_out_of_range() {
        let mut a = arbiter();
        assert_eq!(a.set_time(42), Ok(23));
        assert_eq!(a.set_time(-1), Ok(0));
        assert_eq!(a.set_temperature(500.0), Ok(120.0));
        assert_eq!(a.set_temperature(-500.0), Ok(10.0));
    }
}
