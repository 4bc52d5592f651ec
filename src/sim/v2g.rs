//! Emergency vehicle-to-grid dispatch for failed substations.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::grid::GridStateMachine;
use super::substation::Position;
use super::types::{serialize_opt_secs, serialize_secs};
use crate::error::{GridError, Result};
use crate::fleet::{Discharge, VehicleAsset};

/// Recruitment, discharge, and pricing policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct V2gParams {
    /// Minimum state of charge for a vehicle to be recruited.
    pub recruit_soc_floor: f64,
    /// A participant stops discharging once it would fall to this level.
    pub safety_soc_floor: f64,
    pub service_radius_km: f64,
    /// Discharge power of one participant (kW).
    pub discharge_kw: f64,
    /// Window without a new recruit after which a session times out.
    pub recruitment_timeout_s: f64,
    pub market_price_per_kwh: f64,
    /// Price multiplier gain per unit of schedule shortfall.
    pub urgency_gain: f64,
    pub max_price_multiplier: f64,
    /// Nominal time to reach the target, used to measure schedule shortfall.
    pub target_duration_s: f64,
    /// Ended sessions kept for reporting.
    pub history_limit: usize,
}

impl Default for V2gParams {
    fn default() -> Self {
        Self {
            recruit_soc_floor: 0.70,
            safety_soc_floor: 0.20,
            service_radius_km: 3.0,
            discharge_kw: 50.0,
            recruitment_timeout_s: 600.0,
            market_price_per_kwh: 0.30,
            urgency_gain: 1.0,
            max_price_multiplier: 3.0,
            target_duration_s: 900.0,
            history_limit: 64,
        }
    }
}

impl V2gParams {
    /// Saturates at `Duration::MAX` for values too large to represent.
    fn recruitment_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.recruitment_timeout_s.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Energy `vehicle` can give in one tick, and whether giving it takes
    /// the vehicle down to the safety floor.
    fn tick_contribution(&self, vehicle: &VehicleAsset, tick_hours: f64) -> (f64, bool) {
        let per_tick = self.discharge_kw.max(0.0) * tick_hours;
        let available = vehicle.energy_above_kwh(self.safety_soc_floor);
        if available <= per_tick {
            (available, true)
        } else {
            (per_tick, false)
        }
    }

    /// Deterministic urgency pricing.
    ///
    /// The market price is scaled up by how far delivery lags a linear
    /// schedule toward the target, capped at `max_price_multiplier`.
    pub fn price_per_kwh(&self, target_kwh: f64, delivered_kwh: f64, elapsed: Duration) -> f64 {
        let progress = if self.target_duration_s > 0.0 {
            (elapsed.as_secs_f64() / self.target_duration_s).min(1.0)
        } else {
            1.0
        };
        let expected = target_kwh * progress;
        let behind = ((expected - delivered_kwh) / target_kwh).clamp(0.0, 1.0);
        let multiplier = (1.0 + self.urgency_gain * behind).min(self.max_price_multiplier);
        self.market_price_per_kwh * multiplier.max(0.0)
    }
}

/// Lifecycle of a dispatch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Recruiting,
    TargetMet,
    TimedOut,
    Cancelled,
}

impl SessionStatus {
    pub fn is_active(&self) -> bool {
        *self == Self::Recruiting
    }
}

/// One recruited vehicle. Membership is permanent for the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Participant {
    pub vehicle_id: String,
    pub delivered_kwh: f64,
    /// `false` once the vehicle hit the safety floor or left the feed.
    pub active: bool,
    #[serde(rename = "recruited_at_s", serialize_with = "serialize_secs")]
    pub recruited_at: Duration,
}

/// A dispatch session closing the energy deficit of one failed substation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct V2gSession {
    pub substation_id: String,
    pub target_kwh: f64,
    pub delivered_kwh: f64,
    pub price_per_kwh: f64,
    pub revenue: f64,
    pub status: SessionStatus,
    pub participants: Vec<Participant>,
    #[serde(rename = "started_at_s", serialize_with = "serialize_secs")]
    pub started_at: Duration,
    #[serde(rename = "ended_at_s", serialize_with = "serialize_opt_secs")]
    pub ended_at: Option<Duration>,
    #[serde(rename = "timeout_deadline_s", serialize_with = "serialize_secs")]
    pub timeout_deadline: Duration,
    #[serde(skip)]
    members: HashSet<String>,
}

impl V2gSession {
    fn new(substation_id: &str, target_kwh: f64, price_per_kwh: f64, now: Duration, timeout: Duration) -> Self {
        Self {
            substation_id: substation_id.to_string(),
            target_kwh,
            delivered_kwh: 0.0,
            price_per_kwh,
            revenue: 0.0,
            status: SessionStatus::Recruiting,
            participants: Vec::new(),
            started_at: now,
            ended_at: None,
            timeout_deadline: now.saturating_add(timeout),
            members: HashSet::new(),
        }
    }

    pub fn is_participant(&self, vehicle_id: &str) -> bool {
        self.members.contains(vehicle_id)
    }

    pub fn active_participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.active)
    }

    /// Energy still missing to reach the target (kWh).
    pub fn deficit_kwh(&self) -> f64 {
        (self.target_kwh - self.delivered_kwh).max(0.0)
    }

    /// Delivered energy, or `InsufficientAssets` if recruitment timed out.
    pub fn outcome(&self) -> Result<f64> {
        match self.status {
            SessionStatus::TimedOut => Err(GridError::InsufficientAssets(self.substation_id.clone())),
            _ => Ok(self.delivered_kwh),
        }
    }

    fn recruit(&mut self, vehicle_id: &str, now: Duration) {
        if self.members.insert(vehicle_id.to_string()) {
            self.participants.push(Participant {
                vehicle_id: vehicle_id.to_string(),
                delivered_kwh: 0.0,
                active: true,
                recruited_at: now,
            });
        }
    }

    fn finish(&mut self, status: SessionStatus, now: Duration) {
        self.status = status;
        self.ended_at = Some(now);
    }
}

/// What one dispatcher step produced.
#[derive(Debug, Clone, Default)]
pub struct DispatchStep {
    /// Energy drawn per vehicle, to report back to the vehicle feed.
    pub discharges: Vec<Discharge>,
    pub delivered_kwh: f64,
    pub revenue: f64,
    /// Sessions that reached a terminal status on this step.
    pub ended: Vec<V2gSession>,
}

/// Runs at most one session per substation and keeps a bounded history of
/// ended sessions.
#[derive(Debug, Clone, Default)]
pub struct V2gDispatcher {
    params: V2gParams,
    active: BTreeMap<String, V2gSession>,
    history: VecDeque<V2gSession>,
}

impl V2gDispatcher {
    pub fn new(params: V2gParams) -> Self {
        Self {
            params,
            active: BTreeMap::new(),
            history: VecDeque::new(),
        }
    }

    pub fn params(&self) -> &V2gParams {
        &self.params
    }

    pub fn session(&self, substation_id: &str) -> Option<&V2gSession> {
        self.active.get(substation_id)
    }

    /// Active sessions ordered by substation id.
    pub fn sessions(&self) -> impl Iterator<Item = &V2gSession> {
        self.active.values()
    }

    /// Ended sessions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &V2gSession> {
        self.history.iter()
    }

    /// Opens a session for a failed substation.
    ///
    /// # Arguments
    ///
    /// * `grid` - Substation table, used to check the failed precondition
    /// * `substation_id` - Substation to supply
    /// * `target_kwh` - Energy to deliver (must be finite and > 0)
    /// * `now` - Current simulated time
    ///
    /// # Errors
    ///
    /// `InvalidSubstationId`, `InvalidArgument` for a bad target, `NotFailed`
    /// if the substation is operational, `SessionAlreadyActive` if one exists.
    pub fn start_session(
        &mut self,
        grid: &GridStateMachine,
        substation_id: &str,
        target_kwh: f64,
        now: Duration,
    ) -> Result<&V2gSession> {
        let sub = grid.get(substation_id)?;
        if !target_kwh.is_finite() || target_kwh <= 0.0 {
            return Err(GridError::InvalidArgument(format!(
                "target must be a positive kWh amount, got {target_kwh}"
            )));
        }
        if !sub.is_failed() {
            return Err(GridError::NotFailed(sub.id.clone()));
        }
        if self.active.contains_key(substation_id) {
            return Err(GridError::SessionAlreadyActive(sub.id.clone()));
        }

        let session = V2gSession::new(
            &sub.id,
            target_kwh,
            self.params.market_price_per_kwh,
            now,
            self.params.recruitment_timeout(),
        );
        info!(substation = %sub.id, target_kwh, "V2G session started");
        Ok(self.active.entry(sub.id.clone()).or_insert(session))
    }

    /// Closes the active session of `substation_id` as `Cancelled`.
    ///
    /// Energy delivered so far is kept on the session for reporting.
    ///
    /// # Errors
    ///
    /// `NoActiveSession` if the substation has none.
    pub fn cancel(&mut self, substation_id: &str, now: Duration) -> Result<V2gSession> {
        let mut session = self
            .active
            .remove(substation_id)
            .ok_or_else(|| GridError::NoActiveSession(substation_id.to_string()))?;
        session.finish(SessionStatus::Cancelled, now);
        info!(
            substation = substation_id,
            delivered_kwh = session.delivered_kwh,
            "V2G session cancelled"
        );
        self.archive(session.clone());
        Ok(session)
    }

    fn archive(&mut self, session: V2gSession) {
        self.history.push_back(session);
        while self.history.len() > self.params.history_limit {
            self.history.pop_front();
        }
    }

    /// Advances every active session by one tick.
    ///
    /// Per session: price the tick, recruit eligible vehicles greedily,
    /// draw one tick of energy from each active participant, then check
    /// the target and the recruitment timeout.
    ///
    /// # Arguments
    ///
    /// * `now` - Simulated time of the tick being evaluated
    /// * `tick_hours` - Duration of one tick in hours
    /// * `vehicles` - Vehicle feed snapshot for this tick
    /// * `grid` - Substation table, for service-area positions
    pub fn step(
        &mut self,
        now: Duration,
        tick_hours: f64,
        vehicles: &[VehicleAsset],
        grid: &GridStateMachine,
    ) -> DispatchStep {
        let mut out = DispatchStep::default();
        if self.active.is_empty() {
            return out;
        }

        let by_id: HashMap<&str, &VehicleAsset> =
            vehicles.iter().map(|v| (v.id.as_str(), v)).collect();
        let mut busy: HashSet<String> = self
            .active
            .values()
            .flat_map(|s| s.active_participants().map(|p| p.vehicle_id.clone()))
            .collect();

        let params = &self.params;
        let mut ended_ids = Vec::new();
        for (id, session) in &mut self.active {
            let Ok(sub) = grid.get(id) else {
                continue;
            };
            let elapsed = now.saturating_sub(session.started_at);
            session.price_per_kwh =
                params.price_per_kwh(session.target_kwh, session.delivered_kwh, elapsed);

            let recruited = recruit(params, session, sub.position, vehicles, &mut busy, tick_hours, now);
            let delivered = deliver(params, session, &by_id, &mut busy, tick_hours, &mut out.discharges);

            let revenue = delivered * session.price_per_kwh;
            session.delivered_kwh += delivered;
            session.revenue += revenue;
            out.delivered_kwh += delivered;
            out.revenue += revenue;

            if recruited > 0 {
                session.timeout_deadline = now.saturating_add(params.recruitment_timeout());
            }
            debug!(
                substation = %id,
                recruited,
                delivered_kwh = delivered,
                total_kwh = session.delivered_kwh,
                price = session.price_per_kwh,
                "V2G step"
            );

            if session.delivered_kwh >= session.target_kwh {
                session.finish(SessionStatus::TargetMet, now);
                info!(
                    substation = %id,
                    delivered_kwh = session.delivered_kwh,
                    participants = session.participants.len(),
                    "V2G target met"
                );
                ended_ids.push(id.clone());
            } else if now >= session.timeout_deadline {
                session.finish(SessionStatus::TimedOut, now);
                warn!(
                    substation = %id,
                    delivered_kwh = session.delivered_kwh,
                    target_kwh = session.target_kwh,
                    "V2G recruitment timed out"
                );
                ended_ids.push(id.clone());
            }
        }

        for id in ended_ids {
            if let Some(session) = self.active.remove(&id) {
                self.archive(session.clone());
                out.ended.push(session);
            }
        }
        out
    }
}

/// Greedily adds eligible vehicles to `session`; returns how many joined.
fn recruit(
    params: &V2gParams,
    session: &mut V2gSession,
    site: Position,
    vehicles: &[VehicleAsset],
    busy: &mut HashSet<String>,
    tick_hours: f64,
    now: Duration,
) -> usize {
    let mut pledged = session.delivered_kwh
        + session
            .active_participants()
            .filter_map(|p| vehicles.iter().find(|v| v.id == p.vehicle_id))
            .map(|v| params.tick_contribution(v, tick_hours).0)
            .sum::<f64>();
    if pledged >= session.target_kwh {
        return 0;
    }

    let mut eligible: Vec<(&VehicleAsset, f64)> = vehicles
        .iter()
        .filter(|v| v.state_of_charge >= params.recruit_soc_floor)
        .filter(|v| !session.is_participant(&v.id) && !busy.contains(&v.id))
        .map(|v| (v, v.position.distance_km(&site)))
        .filter(|(_, d)| *d <= params.service_radius_km)
        .collect();
    eligible.sort_by(|(a, da), (b, db)| {
        b.state_of_charge
            .total_cmp(&a.state_of_charge)
            .then(da.total_cmp(db))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut count = 0;
    for (v, distance_km) in eligible {
        if pledged >= session.target_kwh {
            break;
        }
        let (expected, _) = params.tick_contribution(v, tick_hours);
        if expected <= 0.0 {
            continue;
        }
        session.recruit(&v.id, now);
        busy.insert(v.id.clone());
        pledged += expected;
        count += 1;
        debug!(substation = %session.substation_id, vehicle = %v.id, soc = v.state_of_charge, distance_km, "vehicle recruited");
    }
    count
}

/// Draws one tick of energy from every active participant; returns the total.
fn deliver(
    params: &V2gParams,
    session: &mut V2gSession,
    by_id: &HashMap<&str, &VehicleAsset>,
    busy: &mut HashSet<String>,
    tick_hours: f64,
    discharges: &mut Vec<Discharge>,
) -> f64 {
    let mut total = 0.0;
    for p in session.participants.iter_mut().filter(|p| p.active) {
        let Some(vehicle) = by_id.get(p.vehicle_id.as_str()) else {
            debug!(vehicle = %p.vehicle_id, "participant left the feed");
            p.active = false;
            busy.remove(&p.vehicle_id);
            continue;
        };
        let (energy, exhausted) = params.tick_contribution(vehicle, tick_hours);
        if energy > 0.0 {
            p.delivered_kwh += energy;
            total += energy;
            discharges.push(Discharge {
                vehicle_id: p.vehicle_id.clone(),
                energy_kwh: energy,
            });
        }
        if exhausted {
            debug!(vehicle = %p.vehicle_id, "participant reached safety floor");
            p.active = false;
            busy.remove(&p.vehicle_id);
        }
    }
    total
}
