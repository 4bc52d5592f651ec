//! Post-hoc KPI computation from simulation snapshots.

use std::fmt;

use serde::Serialize;

use super::cascade::CascadeProgress;
use super::substation::Status;
use super::types::{GridSnapshot, TickEvent};
use super::v2g::SessionStatus;

/// Substation-ticks spent in each status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusTicks {
    pub normal: usize,
    pub warning: usize,
    pub critical: usize,
    pub overload: usize,
    pub failed: usize,
}

impl StatusTicks {
    fn record(&mut self, status: Status) {
        match status {
            Status::Normal => self.normal += 1,
            Status::Warning => self.warning += 1,
            Status::Critical => self.critical += 1,
            Status::Overload => self.overload += 1,
            Status::Failed => self.failed += 1,
        }
    }
}

/// Aggregate key performance indicators derived from a complete run.
///
/// Computed post-hoc from the snapshot sequence so reported metrics always
/// agree with the exported tick data.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KpiReport {
    pub ticks: usize,
    /// Highest utilization seen on any substation.
    pub peak_utilization: f64,
    pub peak_substation: Option<String>,
    /// Highest city-wide demand (MW).
    pub peak_total_load_mw: f64,
    pub status_ticks: StatusTicks,
    /// Failures caused by sustained overload.
    pub trips: usize,
    /// Failures forced by operator command.
    pub manual_failures: usize,
    /// Failures forced by cascade steps.
    pub cascade_failures: usize,
    /// Energy delivered by V2G sessions, ended or still running (kWh).
    pub v2g_energy_kwh: f64,
    pub v2g_revenue: f64,
    pub sessions_target_met: usize,
    pub sessions_timed_out: usize,
    pub sessions_cancelled: usize,
    /// Sessions still recruiting after the last tick.
    pub sessions_active: usize,
    /// Ticks whose power-flow check reported an infeasible load vector.
    pub infeasible_power_flow_ticks: usize,
}

impl KpiReport {
    /// Computes all KPIs from the snapshot sequence of a run.
    ///
    /// # Arguments
    ///
    /// * `snapshots` - Snapshots in tick order
    /// * `manual_failures` - Operator-forced failures over the run
    pub fn from_snapshots(snapshots: &[GridSnapshot], manual_failures: usize) -> Self {
        let mut report = Self {
            ticks: snapshots.len(),
            manual_failures,
            ..Self::default()
        };

        for snap in snapshots {
            report.peak_total_load_mw = report.peak_total_load_mw.max(snap.total_load_mw);
            for s in &snap.substations {
                report.status_ticks.record(s.status);
                if s.utilization > report.peak_utilization {
                    report.peak_utilization = s.utilization;
                    report.peak_substation = Some(s.id.clone());
                }
            }
            if snap.power_flow.as_ref().is_some_and(|pf| !pf.feasible) {
                report.infeasible_power_flow_ticks += 1;
            }

            for event in &snap.events {
                match event {
                    TickEvent::Tripped { .. } => report.trips += 1,
                    TickEvent::Cascade {
                        progress: CascadeProgress::Failed { .. },
                    } => report.cascade_failures += 1,
                    TickEvent::SessionEnded {
                        status,
                        delivered_kwh,
                        revenue,
                        ..
                    } => {
                        report.v2g_energy_kwh += delivered_kwh;
                        report.v2g_revenue += revenue;
                        match status {
                            SessionStatus::TargetMet => report.sessions_target_met += 1,
                            SessionStatus::TimedOut => report.sessions_timed_out += 1,
                            SessionStatus::Cancelled => report.sessions_cancelled += 1,
                            SessionStatus::Recruiting => {}
                        }
                    }
                    _ => {}
                }
            }
        }

        if let Some(last) = snapshots.last() {
            report.sessions_active = last.sessions.len();
            for s in &last.sessions {
                report.v2g_energy_kwh += s.delivered_kwh;
                report.v2g_revenue += s.revenue;
            }
        }
        report
    }
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ---")?;
        writeln!(f, "Ticks:                 {}", self.ticks)?;
        writeln!(
            f,
            "Peak utilization:      {:.1}% ({})",
            self.peak_utilization * 100.0,
            self.peak_substation.as_deref().unwrap_or("-")
        )?;
        writeln!(f, "Peak city load:        {:.1} MW", self.peak_total_load_mw)?;
        let st = &self.status_ticks;
        writeln!(
            f,
            "Status ticks N/W/C/O/F: {}/{}/{}/{}/{}",
            st.normal, st.warning, st.critical, st.overload, st.failed
        )?;
        writeln!(
            f,
            "Failures:              {} trips, {} manual, {} cascade",
            self.trips, self.manual_failures, self.cascade_failures
        )?;
        writeln!(
            f,
            "V2G delivered:         {:.2} kWh (revenue {:.2})",
            self.v2g_energy_kwh, self.v2g_revenue
        )?;
        writeln!(
            f,
            "V2G sessions:          {} met, {} timed out, {} cancelled, {} active",
            self.sessions_target_met,
            self.sessions_timed_out,
            self.sessions_cancelled,
            self.sessions_active
        )?;
        write!(f, "Infeasible power flow: {} ticks", self.infeasible_power_flow_ticks)
    }
}
