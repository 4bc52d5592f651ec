//! Ordered, timed multi-substation failure sequence ("blackout").

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::grid::GridStateMachine;
use crate::error::GridError;

/// Scenario id under which a cascade holds the arbiter lock.
pub const CASCADE_SCENARIO_ID: &str = "blackout_cascade";

/// Lifecycle of a cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CascadeStatus {
    Running,
    Completed,
    Cancelled,
}

/// Something that happened while advancing a cascade on one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CascadeProgress {
    /// The scheduled substation was forced into `Failed`.
    Failed { substation_id: String },
    /// The scheduled substation was already failed; the step is consumed.
    Skipped { substation_id: String },
    Completed,
    Cancelled,
}

/// A scheduled sequence of forced failures.
///
/// Steps fire in list order, at most one per tick: the first on the next
/// tick boundary after the cascade starts, each later one `step_delay` after
/// the previous fired. Cancellation is cooperative: it only takes effect on
/// the next call to [`FailureCascade::advance`], and never undoes a failure
/// that already happened.
#[derive(Debug, Clone)]
pub struct FailureCascade {
    remaining: VecDeque<String>,
    survivor: Option<String>,
    step_delay: Duration,
    next_due: Duration,
    failed: Vec<String>,
    skipped: Vec<String>,
    status: CascadeStatus,
    cancel_requested: bool,
    started_at: Duration,
}

impl FailureCascade {
    /// Schedules `order` (minus `survivor`) starting at `now`.
    pub fn new(
        order: Vec<String>,
        step_delay: Duration,
        survivor: Option<String>,
        now: Duration,
    ) -> Self {
        let remaining = order
            .into_iter()
            .filter(|id| survivor.as_deref() != Some(id.as_str()))
            .collect();
        Self {
            remaining,
            survivor,
            step_delay,
            next_due: now,
            failed: Vec::new(),
            skipped: Vec::new(),
            status: CascadeStatus::Running,
            cancel_requested: false,
            started_at: now,
        }
    }

    pub fn status(&self) -> CascadeStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == CascadeStatus::Running
    }

    /// Substations this cascade has failed so far, in order.
    pub fn failed(&self) -> &[String] {
        &self.failed
    }

    /// Asks the cascade to stop at the next tick boundary.
    pub fn request_cancel(&mut self) {
        if self.is_running() {
            self.cancel_requested = true;
        }
    }

    /// Advances the cascade to `now`, failing at most one substation.
    pub fn advance(&mut self, now: Duration, grid: &mut GridStateMachine) -> Vec<CascadeProgress> {
        if !self.is_running() {
            return Vec::new();
        }
        if self.cancel_requested {
            self.status = CascadeStatus::Cancelled;
            info!(
                failed = self.failed.len(),
                not_fired = self.remaining.len(),
                "failure cascade cancelled"
            );
            return vec![CascadeProgress::Cancelled];
        }

        let mut progress = Vec::new();
        if now >= self.next_due {
            if let Some(id) = self.remaining.pop_front() {
                match grid.fail(&id) {
                    Ok(_) => {
                        info!(substation = %id, step = self.failed.len() + 1, "cascade step fired");
                        self.failed.push(id.clone());
                        progress.push(CascadeProgress::Failed { substation_id: id });
                    }
                    Err(GridError::AlreadyFailed(_)) => {
                        debug!(substation = %id, "cascade step skipped, already failed");
                        self.skipped.push(id.clone());
                        progress.push(CascadeProgress::Skipped { substation_id: id });
                    }
                    Err(err) => {
                        warn!(substation = %id, error = %err, "cascade step rejected");
                        self.skipped.push(id.clone());
                        progress.push(CascadeProgress::Skipped { substation_id: id });
                    }
                }
                self.next_due = now.saturating_add(self.step_delay);
            }
        }

        if self.remaining.is_empty() {
            self.status = CascadeStatus::Completed;
            info!(failed = self.failed.len(), "failure cascade completed");
            progress.push(CascadeProgress::Completed);
        }
        progress
    }

    /// Serializable view for snapshots.
    pub fn view(&self) -> CascadeView {
        CascadeView {
            scenario_id: CASCADE_SCENARIO_ID.to_string(),
            status: self.status,
            failed: self.failed.clone(),
            skipped: self.skipped.clone(),
            remaining: self.remaining.iter().cloned().collect(),
            survivor: self.survivor.clone(),
            started_at_s: self.started_at.as_secs_f64(),
            next_due_s: self.is_running().then(|| self.next_due.as_secs_f64()),
            cancel_requested: self.cancel_requested,
        }
    }
}

/// Snapshot of a cascade for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadeView {
    pub scenario_id: String,
    pub status: CascadeStatus,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
    pub remaining: Vec<String>,
    pub survivor: Option<String>,
    pub started_at_s: f64,
    pub next_due_s: Option<f64>,
    pub cancel_requested: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::grid::DEFAULT_TRIP_WINDOW;
    use crate::sim::load_model::LoadProfile;
    use crate::sim::substation::{Position, Substation};

    fn grid(ids: &[&str]) -> GridStateMachine {
        let subs = ids
            .iter()
            .map(|id| {
                Substation::new(*id, *id, 100.0, 1.0, 0.0, LoadProfile::Mixed, Position::default())
            })
            .collect();
        GridStateMachine::new(subs, DEFAULT_TRIP_WINDOW)
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn fires_in_order_with_delay_skipping_survivor() {
        let mut g = grid(&["a", "b", "c"]);
        let mut c = FailureCascade::new(ids(&["a", "b", "c"]), secs(10), Some("b".into()), secs(0));

        let p = c.advance(secs(1), &mut g);
        assert_eq!(p, vec![CascadeProgress::Failed { substation_id: "a".into() }]);

        assert!(c.advance(secs(5), &mut g).is_empty());

        let p = c.advance(secs(11), &mut g);
        assert_eq!(
            p,
            vec![
                CascadeProgress::Failed { substation_id: "c".into() },
                CascadeProgress::Completed,
            ]
        );
        assert!(g.get("b").is_ok_and(|s| !s.is_failed()));
        assert_eq!(c.status(), CascadeStatus::Completed);
    }

    #[test]
    fn cancel_stops_further_failures() {
        let mut g = grid(&["a", "b", "c"]);
        let mut c = FailureCascade::new(ids(&["a", "b", "c"]), secs(10), None, secs(0));
        c.advance(secs(1), &mut g);
        c.request_cancel();
        let p = c.advance(secs(100), &mut g);
        assert_eq!(p, vec![CascadeProgress::Cancelled]);
        assert!(c.advance(secs(200), &mut g).is_empty());

        assert!(g.get("a").is_ok_and(|s| s.is_failed()));
        assert!(g.get("b").is_ok_and(|s| !s.is_failed()));
        assert!(g.get("c").is_ok_and(|s| !s.is_failed()));
        assert_eq!(c.failed(), &["a".to_string()]);
    }

    #[test]
    fn already_failed_step_is_skipped() {
        let mut g = grid(&["a", "b"]);
        g.fail("a").ok();
        let mut c = FailureCascade::new(ids(&["a", "b"]), secs(0), None, secs(0));
        let p = c.advance(secs(1), &mut g);
        assert_eq!(p, vec![CascadeProgress::Skipped { substation_id: "a".into() }]);
        let p = c.advance(secs(2), &mut g);
        assert_eq!(p.len(), 2);
        assert!(c.failed().contains(&"b".to_string()));
    }

    #[test]
    fn one_step_per_tick_even_with_zero_delay() {
        let mut g = grid(&["a", "b", "c"]);
        let mut c = FailureCascade::new(ids(&["a", "b", "c"]), Duration::ZERO, None, secs(0));
        c.advance(secs(1), &mut g);
        assert_eq!(c.failed().len(), 1);
        c.advance(secs(2), &mut g);
        assert_eq!(c.failed().len(), 2);
    }

    #[test]
    fn empty_schedule_completes_immediately() {
        let mut g = grid(&["a"]);
        let mut c = FailureCascade::new(ids(&["a"]), secs(5), Some("a".into()), secs(0));
        assert_eq!(c.advance(secs(1), &mut g), vec![CascadeProgress::Completed]);
    }
}
