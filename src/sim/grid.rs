//! Per-substation status state machine with trip countdowns.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use super::substation::{Status, Substation};
use super::types::SubstationStatus;
use crate::error::{GridError, Result};

/// Default sustained-overload window before a substation trips.
pub const DEFAULT_TRIP_WINDOW: Duration = Duration::from_secs(30);

/// A status change produced by one update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub substation_id: String,
    pub from: Status,
    pub to: Status,
}

impl Transition {
    /// `true` when the change is an overload trip into `Failed`.
    pub fn is_trip(&self) -> bool {
        self.from == Status::Overload && self.to == Status::Failed
    }
}

/// Owns the substation table and applies the threshold/countdown rules.
///
/// Substations live in one indexed table for the lifetime of the
/// simulation; they are never removed, only mutated.
#[derive(Debug, Clone)]
pub struct GridStateMachine {
    substations: Vec<Substation>,
    index: HashMap<String, usize>,
    trip_window: Duration,
}

impl GridStateMachine {
    /// Builds the table from static topology.
    ///
    /// # Panics
    ///
    /// Panics if two substations share an id.
    pub fn new(substations: Vec<Substation>, trip_window: Duration) -> Self {
        let mut index = HashMap::with_capacity(substations.len());
        for (i, s) in substations.iter().enumerate() {
            let previous = index.insert(s.id.clone(), i);
            assert!(previous.is_none(), "duplicate substation id {}", s.id);
        }
        Self {
            substations,
            index,
            trip_window,
        }
    }

    pub fn trip_window(&self) -> Duration {
        self.trip_window
    }

    pub fn substations(&self) -> &[Substation] {
        &self.substations
    }

    pub fn len(&self) -> usize {
        self.substations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.substations.is_empty()
    }

    /// Table index of `id`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSubstationId` if `id` is unknown.
    pub fn index_of(&self, id: &str) -> Result<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| GridError::InvalidSubstationId(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Result<&Substation> {
        self.index_of(id).map(|i| &self.substations[i])
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Result<&mut Substation> {
        let i = self.index_of(id)?;
        Ok(&mut self.substations[i])
    }

    pub(crate) fn by_index(&self, idx: usize) -> &Substation {
        &self.substations[idx]
    }

    /// Records `load_mw` for substation `idx` and re-evaluates its status at `now`.
    ///
    /// A failed substation stays failed whatever its utilization. Entering
    /// overload starts a countdown of `trip_window`; the countdown is dropped
    /// (not paused) as soon as utilization falls back below the overload
    /// threshold, and if it elapses while still overloaded the substation fails.
    ///
    /// # Returns
    ///
    /// The transition, if the status changed.
    pub fn update(&mut self, idx: usize, load_mw: f64, now: Duration) -> Option<Transition> {
        let window = self.trip_window;
        let sub = &mut self.substations[idx];
        sub.current_load_mw = load_mw;

        if sub.is_failed() {
            return None;
        }

        let from = sub.status;
        let to = match Status::from_utilization(sub.utilization()) {
            Status::Overload => match sub.trip_deadline {
                None => {
                    sub.trip_deadline = Some(now.saturating_add(window));
                    Status::Overload
                }
                Some(deadline) if now >= deadline => {
                    sub.trip_deadline = None;
                    Status::Failed
                }
                Some(_) => Status::Overload,
            },
            bucket => {
                sub.trip_deadline = None;
                bucket
            }
        };
        sub.status = to;

        if from == to {
            return None;
        }
        let transition = Transition {
            substation_id: sub.id.clone(),
            from,
            to,
        };
        if transition.is_trip() {
            warn!(
                substation = %sub.id,
                load_mw = sub.current_load_mw,
                utilization = sub.utilization(),
                "sustained overload tripped substation"
            );
        }
        Some(transition)
    }

    /// Forces `id` into `Failed` regardless of utilization.
    ///
    /// # Returns
    ///
    /// The status held before the failure.
    ///
    /// # Errors
    ///
    /// `InvalidSubstationId` for an unknown id, `AlreadyFailed` if it is failed.
    pub fn fail(&mut self, id: &str) -> Result<Status> {
        let sub = self.get_mut(id)?;
        if sub.is_failed() {
            return Err(GridError::AlreadyFailed(sub.id.clone()));
        }
        let previous = sub.status;
        sub.status = Status::Failed;
        sub.trip_deadline = None;
        info!(substation = %sub.id, from = %previous, "substation failed");
        Ok(previous)
    }

    /// Brings a failed substation back, recomputing its status from current
    /// utilization and clearing any countdown.
    ///
    /// A substation restored into the overload band gets a fresh countdown
    /// on the next update.
    ///
    /// # Returns
    ///
    /// The recomputed status.
    ///
    /// # Errors
    ///
    /// `InvalidSubstationId` for an unknown id, `AlreadyOperational` if not failed.
    pub fn restore(&mut self, id: &str) -> Result<Status> {
        let sub = self.get_mut(id)?;
        if !sub.is_failed() {
            return Err(GridError::AlreadyOperational(sub.id.clone()));
        }
        sub.status = Status::from_utilization(sub.utilization());
        sub.trip_deadline = None;
        info!(substation = %sub.id, status = %sub.status, "substation restored");
        Ok(sub.status)
    }

    pub(crate) fn set_v2g_enabled(&mut self, id: &str, enabled: bool) -> Result<()> {
        self.get_mut(id)?.v2g_enabled = enabled;
        Ok(())
    }

    /// Pins the demand of `id` to `load_mw` until cleared.
    ///
    /// # Errors
    ///
    /// `InvalidSubstationId`, or `InvalidArgument` for a negative or non-finite load.
    pub fn force_load(&mut self, id: &str, load_mw: f64) -> Result<()> {
        if !load_mw.is_finite() || load_mw < 0.0 {
            return Err(GridError::InvalidArgument(format!(
                "forced load must be a finite, non-negative MW value, got {load_mw}"
            )));
        }
        self.get_mut(id)?.load_override_mw = Some(load_mw);
        Ok(())
    }

    /// Returns `id` to model-driven demand.
    pub fn clear_load_override(&mut self, id: &str) -> Result<()> {
        self.get_mut(id)?.load_override_mw = None;
        Ok(())
    }

    /// Status view of `id` at `now`.
    pub fn status(&self, id: &str, now: Duration) -> Result<SubstationStatus> {
        self.get(id).map(|s| SubstationStatus::of(s, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::load_model::LoadProfile;
    use crate::sim::substation::Position;

    fn grid() -> GridStateMachine {
        let s = Substation::new(
            "s1",
            "One",
            100.0,
            1.0,
            0.0,
            LoadProfile::Mixed,
            Position::default(),
        );
        GridStateMachine::new(vec![s], DEFAULT_TRIP_WINDOW)
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn update_buckets_by_utilization() {
        let mut g = grid();
        assert!(g.update(0, 50.0, secs(1)).is_none());
        let t = g.update(0, 90.0, secs(2));
        assert_eq!(t.map(|t| t.to), Some(Status::Warning));
        g.update(0, 100.0, secs(3));
        assert_eq!(g.by_index(0).status, Status::Critical);
    }

    #[test]
    fn entering_overload_starts_countdown() {
        let mut g = grid();
        g.update(0, 110.0, secs(5));
        let s = g.by_index(0);
        assert_eq!(s.status, Status::Overload);
        assert_eq!(s.trip_deadline, Some(secs(35)));
    }

    #[test]
    fn countdown_elapsing_fails_substation() {
        let mut g = grid();
        g.update(0, 110.0, secs(0));
        assert!(g.update(0, 110.0, secs(29)).is_none());
        let t = g.update(0, 110.0, secs(30));
        assert!(t.as_ref().is_some_and(Transition::is_trip));
        assert!(g.by_index(0).is_failed());
        assert_eq!(g.by_index(0).trip_deadline, None);
    }

    #[test]
    fn dip_below_threshold_resets_countdown() {
        let mut g = grid();
        g.update(0, 110.0, secs(0));
        g.update(0, 104.0, secs(20));
        assert_eq!(g.by_index(0).trip_deadline, None);
        g.update(0, 110.0, secs(25));
        assert_eq!(g.by_index(0).trip_deadline, Some(secs(55)));
        g.update(0, 110.0, secs(30));
        assert!(!g.by_index(0).is_failed());
    }

    #[test]
    fn failed_ignores_utilization_but_records_load() {
        let mut g = grid();
        g.fail("s1").ok();
        assert!(g.update(0, 10.0, secs(1)).is_none());
        assert!(g.by_index(0).is_failed());
        assert_eq!(g.by_index(0).current_load_mw, 10.0);
    }

    #[test]
    fn fail_is_idempotent_with_error() {
        let mut g = grid();
        assert_eq!(g.fail("s1"), Ok(Status::Normal));
        assert_eq!(g.fail("s1"), Err(GridError::AlreadyFailed("s1".into())));
    }

    #[test]
    fn restore_recomputes_from_utilization() {
        let mut g = grid();
        g.update(0, 110.0, secs(0));
        g.fail("s1").ok();
        g.update(0, 110.0, secs(1));
        assert_eq!(g.restore("s1"), Ok(Status::Overload));
        assert_eq!(g.by_index(0).trip_deadline, None);
        // fresh countdown begins on the next update
        g.update(0, 110.0, secs(2));
        assert_eq!(g.by_index(0).trip_deadline, Some(secs(32)));
    }

    #[test]
    fn restore_operational_is_error() {
        let mut g = grid();
        assert_eq!(
            g.restore("s1"),
            Err(GridError::AlreadyOperational("s1".into()))
        );
    }

    #[test]
    fn unknown_id_is_error() {
        let mut g = grid();
        assert_eq!(
            g.fail("nope"),
            Err(GridError::InvalidSubstationId("nope".into()))
        );
        assert!(g.status("nope", secs(0)).is_err());
    }

    #[test]
    fn force_load_rejects_negative() {
        let mut g = grid();
        assert!(g.force_load("s1", -1.0).is_err());
        assert!(g.force_load("s1", f64::NAN).is_err());
        assert!(g.force_load("s1", 5.0).is_ok());
        assert_eq!(g.get("s1").map(|s| s.load_override_mw), Ok(Some(5.0)));
    }

    #[test]
    #[should_panic]
    fn duplicate_ids_panic() {
        let s = Substation::new("dup", "A", 1.0, 1.0, 0.0, LoadProfile::Mixed, Position::default());
        GridStateMachine::new(vec![s.clone(), s], DEFAULT_TRIP_WINDOW);
    }
}
