//! Simulation aggregate: one explicitly owned state tying every component together.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{GridError, Result};
use crate::fleet::{VehicleAsset, VehicleFeed};

use super::arbiter::{ScenarioArbiter, ScenarioKind};
use super::cascade::{CASCADE_SCENARIO_ID, CascadeProgress, FailureCascade};
use super::clock::SimClock;
use super::grid::GridStateMachine;
use super::load_model::{LoadModel, LoadParams};
use super::power_flow::{BusLoad, PowerFlowReport, PowerFlowValidator};
use super::substation::{Status, Substation};
use super::types::{GridSnapshot, SimConfig, SubstationStatus, SubstationView, TickEvent};
use super::v2g::{SessionStatus, V2gDispatcher, V2gParams, V2gSession};
use super::weather::TimeWeather;

/// Scenario id under which an explicit V2G demonstration holds the lock.
pub const V2G_DEMO_SCENARIO_ID: &str = "v2g_demo";

/// The whole simulation state.
///
/// Owns the substation table, time/weather behind the arbiter, the running
/// cascade, the V2G dispatcher, and the external collaborators. Every
/// mutation goes through `&mut self`, so wrapping it in one mutex (see
/// [`crate::sim::ticker::SharedSimulation`]) serializes ticks and commands.
pub struct Simulation {
    config: SimConfig,
    clock: SimClock,
    arbiter: ScenarioArbiter,
    grid: GridStateMachine,
    load_model: LoadModel,
    cascade: Option<FailureCascade>,
    dispatcher: V2gDispatcher,
    feed: Box<dyn VehicleFeed + Send>,
    validator: Option<Box<dyn PowerFlowValidator + Send>>,
    demo_substation: Option<String>,
    last_power_flow: Option<PowerFlowReport>,
    last_events: Vec<TickEvent>,
    /// Events raised by commands between ticks, reported with the next tick.
    pending_events: Vec<TickEvent>,
    manual_failures: usize,
}

impl Simulation {
    /// Creates a simulation at time zero with default load and V2G policy,
    /// noon at 75 °F.
    ///
    /// # Arguments
    ///
    /// * `config` - Timing configuration
    /// * `substations` - Static topology (ids must be unique)
    /// * `feed` - Vehicle feed collaborator
    ///
    /// # Panics
    ///
    /// Panics if two substations share an id.
    pub fn new(config: SimConfig, substations: Vec<Substation>, feed: Box<dyn VehicleFeed + Send>) -> Self {
        let grid = GridStateMachine::new(substations, config.trip_window);
        debug!(feed = feed.feed_type(), substations = grid.len(), "simulation created");
        Self {
            clock: SimClock::new(config.tick),
            arbiter: ScenarioArbiter::new(TimeWeather::new(12, 75.0)),
            grid,
            load_model: LoadModel::default(),
            cascade: None,
            dispatcher: V2gDispatcher::default(),
            feed,
            validator: None,
            demo_substation: None,
            last_power_flow: None,
            last_events: Vec::new(),
            pending_events: Vec::new(),
            manual_failures: 0,
            config,
        }
    }

    pub fn with_weather(mut self, weather: TimeWeather) -> Self {
        self.arbiter = ScenarioArbiter::new(weather);
        self
    }

    pub fn with_load_params(mut self, params: LoadParams) -> Self {
        self.load_model = LoadModel::new(params);
        self
    }

    pub fn with_v2g_params(mut self, params: V2gParams) -> Self {
        self.dispatcher = V2gDispatcher::new(params);
        self
    }

    pub fn with_validator(mut self, validator: Box<dyn PowerFlowValidator + Send>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Current simulated time.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn ticks(&self) -> u64 {
        self.clock.ticks()
    }

    pub fn grid(&self) -> &GridStateMachine {
        &self.grid
    }

    pub fn arbiter(&self) -> &ScenarioArbiter {
        &self.arbiter
    }

    pub fn dispatcher(&self) -> &V2gDispatcher {
        &self.dispatcher
    }

    /// The running cascade, or the last one to finish.
    pub fn cascade(&self) -> Option<&FailureCascade> {
        self.cascade.as_ref()
    }

    pub fn load_model(&self) -> &LoadModel {
        &self.load_model
    }

    /// Operator-forced failures since start.
    pub fn manual_failures(&self) -> usize {
        self.manual_failures
    }

    /// Executes one tick and returns the resulting snapshot.
    ///
    /// Order: advance the clock and time of day, recompute every
    /// substation's load and status, advance the cascade, then the V2G
    /// sessions, and finally run the optional power-flow check.
    pub fn tick(&mut self) -> GridSnapshot {
        let (tick, now) = self.clock.advance();
        self.arbiter
            .advance_time(self.config.tick.mul_f64(self.config.time_of_day_rate));
        let mut events = std::mem::take(&mut self.pending_events);

        let vehicles = self.feed.snapshot(now);
        self.update_loads(&vehicles, now, &mut events);
        self.advance_cascade(now, &mut events);
        self.advance_dispatch(now, &vehicles, &mut events);
        self.last_power_flow = self.validate_power_flow();

        self.last_events = events;
        let snapshot = self.snapshot();
        debug!(tick, summary = %snapshot, "tick");
        snapshot
    }

    fn update_loads(&mut self, vehicles: &[VehicleAsset], now: Duration, events: &mut Vec<TickEvent>) {
        let weather = self.arbiter.weather();
        let hour = weather.fractional_hour();
        let temperature_f = weather.temperature_f();
        let charging = self.charging_counts(vehicles);

        for (idx, charging) in charging.into_iter().enumerate() {
            let sub = self.grid.by_index(idx);
            let load_mw = sub
                .load_override_mw
                .unwrap_or_else(|| self.load_model.compute_load_mw(sub, hour, temperature_f, charging));
            let Some(t) = self.grid.update(idx, load_mw, now) else {
                continue;
            };
            if t.is_trip() {
                events.push(TickEvent::Tripped {
                    substation_id: t.substation_id.clone(),
                });
            }
            events.push(TickEvent::StatusChanged {
                substation_id: t.substation_id,
                from: t.from,
                to: t.to,
            });
        }
    }

    /// Charging vehicles per substation; each goes to the nearest substation
    /// whose service radius contains it.
    fn charging_counts(&self, vehicles: &[VehicleAsset]) -> Vec<usize> {
        let radius = self.dispatcher.params().service_radius_km;
        let mut counts = vec![0; self.grid.len()];
        for v in vehicles.iter().filter(|v| v.charging) {
            let nearest = self
                .grid
                .substations()
                .iter()
                .enumerate()
                .map(|(i, s)| (i, s.position.distance_km(&v.position)))
                .filter(|(_, d)| *d <= radius)
                .min_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((i, _)) = nearest {
                counts[i] += 1;
            }
        }
        counts
    }

    fn advance_cascade(&mut self, now: Duration, events: &mut Vec<TickEvent>) {
        let Some(cascade) = self.cascade.as_mut() else {
            return;
        };
        let mut finished = false;
        for progress in cascade.advance(now, &mut self.grid) {
            if matches!(progress, CascadeProgress::Completed | CascadeProgress::Cancelled) {
                finished = true;
            }
            events.push(TickEvent::Cascade { progress });
        }
        if finished {
            self.release_lock(CASCADE_SCENARIO_ID, events);
        }
    }

    fn advance_dispatch(&mut self, now: Duration, vehicles: &[VehicleAsset], events: &mut Vec<TickEvent>) {
        let step = self
            .dispatcher
            .step(now, self.clock.tick_hours(), vehicles, &self.grid);
        self.feed.apply_discharge(&step.discharges);

        for session in step.ended {
            self.close_session(&session, events);
            if session.status == SessionStatus::TargetMet {
                match self.grid.restore(&session.substation_id) {
                    Ok(status) => {
                        info!(substation = %session.substation_id, %status, "substation restored by V2G");
                        events.push(TickEvent::AutoRestored {
                            substation_id: session.substation_id.clone(),
                            status,
                        });
                    }
                    Err(err) => warn!(substation = %session.substation_id, error = %err, "auto-restore skipped"),
                }
            }
        }
    }

    /// Bookkeeping shared by every way a session can end.
    fn close_session(&mut self, session: &V2gSession, events: &mut Vec<TickEvent>) {
        let id = session.substation_id.as_str();
        if let Err(err) = self.grid.set_v2g_enabled(id, false) {
            warn!(substation = id, error = %err, "clearing V2G flag failed");
        }
        events.push(TickEvent::SessionEnded {
            substation_id: id.to_string(),
            status: session.status,
            delivered_kwh: session.delivered_kwh,
            revenue: session.revenue,
        });
        if self.demo_substation.as_deref() == Some(id) {
            self.demo_substation = None;
            self.release_lock(V2G_DEMO_SCENARIO_ID, events);
        }
    }

    fn release_lock(&mut self, scenario_id: &str, events: &mut Vec<TickEvent>) {
        match self.arbiter.release(scenario_id) {
            Ok(()) => events.push(TickEvent::LockReleased {
                scenario_id: scenario_id.to_string(),
            }),
            Err(err) => warn!(scenario = scenario_id, error = %err, "scenario lock release failed"),
        }
    }

    fn validate_power_flow(&self) -> Option<PowerFlowReport> {
        let validator = self.validator.as_ref()?;
        let buses: Vec<BusLoad> = self
            .grid
            .substations()
            .iter()
            .map(|s| BusLoad {
                substation_id: s.id.clone(),
                load_mw: s.current_load_mw,
                capacity_mw: s.capacity_mw(),
                energized: !s.is_failed(),
            })
            .collect();
        let report = validator.validate(&buses);
        if !report.feasible {
            debug!(validator = validator.validator_type(), min_voltage_pu = ?report.min_voltage_pu(), "power flow infeasible");
        }
        Some(report)
    }

    /// Full grid state as of the last tick, including that tick's events.
    pub fn snapshot(&self) -> GridSnapshot {
        let now = self.clock.now();
        let weather = self.arbiter.weather();
        let substations: Vec<SubstationView> = self
            .grid
            .substations()
            .iter()
            .map(|s| SubstationView::of(s, now))
            .collect();
        GridSnapshot {
            tick: self.clock.ticks(),
            time_s: now.as_secs_f64(),
            hour: weather.hour(),
            fractional_hour: weather.fractional_hour(),
            temperature_f: weather.temperature_f(),
            active_scenario: self.arbiter.lock().cloned(),
            total_load_mw: substations
                .iter()
                .filter(|s| s.status != Status::Failed)
                .map(|s| s.load_mw)
                .sum(),
            substations,
            sessions: self.dispatcher.sessions().cloned().collect(),
            cascade: self.cascade.as_ref().map(|c| c.view()),
            power_flow: self.last_power_flow.clone(),
            events: self.last_events.clone(),
        }
    }

    /// `GetStatus`: utilization, status, and remaining countdown of one substation.
    pub fn status(&self, substation_id: &str) -> Result<SubstationStatus> {
        self.grid.status(substation_id, self.clock.now())
    }

    /// Forces a substation into `Failed`. Any V2G session on it is left running.
    ///
    /// # Errors
    ///
    /// `InvalidSubstationId`, or `AlreadyFailed`.
    pub fn fail(&mut self, substation_id: &str) -> Result<Status> {
        let previous = self.grid.fail(substation_id)?;
        self.manual_failures += 1;
        Ok(previous)
    }

    /// Brings a failed substation back and cancels its V2G session, if any.
    ///
    /// # Returns
    ///
    /// The status recomputed from current utilization.
    ///
    /// # Errors
    ///
    /// `InvalidSubstationId`, or `AlreadyOperational`.
    pub fn restore(&mut self, substation_id: &str) -> Result<Status> {
        let status = self.grid.restore(substation_id)?;
        if self.dispatcher.session(substation_id).is_some() {
            let mut events = Vec::new();
            if let Ok(session) = self.dispatcher.cancel(substation_id, self.clock.now()) {
                self.close_session(&session, &mut events);
            }
            self.pending_events.extend(events);
        }
        Ok(status)
    }

    /// Marks a failed substation V2G-enabled and opens a dispatch session at
    /// the configured market price.
    ///
    /// # Errors
    ///
    /// `InvalidSubstationId`, `InvalidArgument`, `NotFailed`, or `SessionAlreadyActive`.
    pub fn enable_v2g(&mut self, substation_id: &str, target_kwh: f64) -> Result<()> {
        self.dispatcher
            .start_session(&self.grid, substation_id, target_kwh, self.clock.now())?;
        self.grid.set_v2g_enabled(substation_id, true)
    }

    /// Cancels the V2G session of a substation and clears its flag.
    ///
    /// # Errors
    ///
    /// `InvalidSubstationId`, or `NoActiveSession`.
    pub fn disable_v2g(&mut self, substation_id: &str) -> Result<V2gSession> {
        self.grid.index_of(substation_id)?;
        let session = self.dispatcher.cancel(substation_id, self.clock.now())?;
        let mut events = Vec::new();
        self.close_session(&session, &mut events);
        self.pending_events.extend(events);
        Ok(session)
    }

    /// `SetTime`: the applied (clamped) hour, or `ConflictActiveScenario`.
    pub fn set_time(&mut self, hour: i64) -> Result<u8> {
        self.arbiter.set_time(hour)
    }

    /// `SetTemperature`: the applied (clamped) value, or `ConflictActiveScenario`.
    pub fn set_temperature(&mut self, temperature_f: f64) -> Result<f64> {
        self.arbiter.set_temperature(temperature_f)
    }

    /// Starts a scripted failure sequence under the `blackout_cascade` lock.
    ///
    /// # Arguments
    ///
    /// * `order` - Substations to fail, in order
    /// * `step_delay` - Delay between consecutive failures
    /// * `survivor` - Substation skipped by the sequence, if any
    ///
    /// # Errors
    ///
    /// `InvalidSubstationId` for any unknown id, or `ConflictActiveScenario`
    /// if any scenario holds the lock.
    pub fn start_cascade(
        &mut self,
        order: Vec<String>,
        step_delay: Duration,
        survivor: Option<String>,
    ) -> Result<()> {
        for id in order.iter().chain(survivor.iter()) {
            self.grid.index_of(id)?;
        }
        let now = self.clock.now();
        self.arbiter
            .acquire(CASCADE_SCENARIO_ID, ScenarioKind::BlackoutCascade, now)?;
        info!(steps = order.len(), ?step_delay, ?survivor, "failure cascade started");
        self.cascade = Some(FailureCascade::new(order, step_delay, survivor, now));
        Ok(())
    }

    /// Requests cancellation; it takes effect on the next tick.
    ///
    /// # Errors
    ///
    /// `NoActiveCascade` if no cascade is running.
    pub fn cancel_cascade(&mut self) -> Result<()> {
        match self.cascade.as_mut() {
            Some(c) if c.is_running() => {
                c.request_cancel();
                info!("failure cascade cancel requested");
                Ok(())
            }
            _ => Err(GridError::NoActiveCascade),
        }
    }

    /// Explicit V2G demonstration: takes the `v2g_demo` lock, fails the
    /// substation if needed, and starts a session. The lock is released when
    /// that session ends.
    ///
    /// # Errors
    ///
    /// `InvalidSubstationId`, `InvalidArgument`, `SessionAlreadyActive`, or
    /// `ConflictActiveScenario`.
    pub fn run_v2g_demo(&mut self, substation_id: &str, target_kwh: f64) -> Result<()> {
        let sub = self.grid.get(substation_id)?;
        if !target_kwh.is_finite() || target_kwh <= 0.0 {
            return Err(GridError::InvalidArgument(format!(
                "target must be a positive kWh amount, got {target_kwh}"
            )));
        }
        if self.dispatcher.session(&sub.id).is_some() {
            return Err(GridError::SessionAlreadyActive(sub.id.clone()));
        }
        let already_failed = sub.is_failed();

        self.arbiter
            .acquire(V2G_DEMO_SCENARIO_ID, ScenarioKind::V2gDemo, self.clock.now())?;
        if let Err(err) = self.open_demo_session(substation_id, target_kwh, already_failed) {
            let mut events = Vec::new();
            self.release_lock(V2G_DEMO_SCENARIO_ID, &mut events);
            self.pending_events.extend(events);
            return Err(err);
        }
        if !already_failed {
            self.manual_failures += 1;
        }
        self.demo_substation = Some(substation_id.to_string());
        info!(substation = substation_id, target_kwh, "V2G demonstration started");
        Ok(())
    }

    /// Fails the substation if needed and opens the demo session. On error the
    /// substation is put back the way it was.
    fn open_demo_session(&mut self, substation_id: &str, target_kwh: f64, already_failed: bool) -> Result<()> {
        if !already_failed {
            self.grid.fail(substation_id)?;
        }
        let opened = self.enable_v2g(substation_id, target_kwh);
        if opened.is_err() && !already_failed {
            if let Err(err) = self.grid.restore(substation_id) {
                warn!(substation = substation_id, error = %err, "demo rollback failed");
            }
        }
        opened
    }

    /// Takes the lock for an operator drill. Drills block other scenarios
    /// but not time/temperature edits.
    pub fn start_drill(&mut self, drill_id: &str) -> Result<()> {
        self.arbiter
            .acquire(drill_id, ScenarioKind::Drill, self.clock.now())
    }

    /// Releases a drill lock.
    ///
    /// # Errors
    ///
    /// `NotLockOwner` unless `drill_id` holds a drill lock.
    pub fn end_drill(&mut self, drill_id: &str) -> Result<()> {
        let is_drill = self
            .arbiter
            .lock()
            .is_some_and(|l| l.kind == ScenarioKind::Drill);
        if is_drill {
            return self.arbiter.release(drill_id);
        }
        Err(GridError::NotLockOwner {
            requested: drill_id.to_string(),
            held_by: self.arbiter.held_by().map(str::to_string),
        })
    }

    /// Pins the demand of a substation (MW) until cleared.
    pub fn force_load(&mut self, substation_id: &str, load_mw: f64) -> Result<()> {
        self.grid.force_load(substation_id, load_mw)
    }

    pub fn clear_load_override(&mut self, substation_id: &str) -> Result<()> {
        self.grid.clear_load_override(substation_id)
    }
}
