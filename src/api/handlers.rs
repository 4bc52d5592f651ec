//! Request handlers for the API endpoints.
//!
//! Every handler runs its command inside one critical section on the shared
//! simulation, so commands never interleave with a tick.

use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use tracing::info;

use super::types::{
    ApiError, EnableV2gRequest, SetTemperatureRequest, SetTimeRequest, StartCascadeRequest,
    TemperatureResponse, TimeResponse, TransitionResponse, V2gDemoRequest,
};
use crate::error::GridError;
use crate::sim::SharedSimulation;
use crate::sim::types::{GridSnapshot, SubstationStatus};
use crate::sim::v2g::V2gSession;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// `GET /snapshot` → the state as of the last tick.
pub async fn get_snapshot(State(sim): State<SharedSimulation>) -> Json<GridSnapshot> {
    Json(sim.lock().snapshot())
}

/// `GET /substations/{id}/status`
pub async fn get_status(
    State(sim): State<SharedSimulation>,
    Path(id): Path<String>,
) -> ApiResult<SubstationStatus> {
    Ok(Json(sim.lock().status(&id)?))
}

/// `POST /substations/{id}/fail` → the status the substation left.
pub async fn fail(
    State(sim): State<SharedSimulation>,
    Path(id): Path<String>,
) -> ApiResult<TransitionResponse> {
    let previous = sim.lock().fail(&id)?;
    info!(substation = %id, ?previous, "api: substation failed");
    Ok(Json(TransitionResponse {
        substation_id: id,
        status: previous,
    }))
}

/// `POST /substations/{id}/restore` → the recomputed status.
pub async fn restore(
    State(sim): State<SharedSimulation>,
    Path(id): Path<String>,
) -> ApiResult<TransitionResponse> {
    let status = sim.lock().restore(&id)?;
    info!(substation = %id, ?status, "api: substation restored");
    Ok(Json(TransitionResponse {
        substation_id: id,
        status,
    }))
}

/// `POST /substations/{id}/v2g` → 201 with the new session.
pub async fn enable_v2g(
    State(sim): State<SharedSimulation>,
    Path(id): Path<String>,
    Json(req): Json<EnableV2gRequest>,
) -> Result<(StatusCode, Json<V2gSession>), ApiError> {
    let mut sim = sim.lock();
    sim.enable_v2g(&id, req.target_kwh)?;
    let session = sim
        .dispatcher()
        .session(&id)
        .cloned()
        .ok_or_else(|| GridError::NoActiveSession(id.clone()))?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// `DELETE /substations/{id}/v2g` → the cancelled session.
pub async fn disable_v2g(
    State(sim): State<SharedSimulation>,
    Path(id): Path<String>,
) -> ApiResult<V2gSession> {
    Ok(Json(sim.lock().disable_v2g(&id)?))
}

/// `POST /time` → the applied hour.
pub async fn set_time(
    State(sim): State<SharedSimulation>,
    Json(req): Json<SetTimeRequest>,
) -> ApiResult<TimeResponse> {
    let hour = sim.lock().set_time(req.hour)?;
    Ok(Json(TimeResponse { hour }))
}

/// `POST /temperature` → the applied temperature.
pub async fn set_temperature(
    State(sim): State<SharedSimulation>,
    Json(req): Json<SetTemperatureRequest>,
) -> ApiResult<TemperatureResponse> {
    let temperature_f = sim.lock().set_temperature(req.temperature_f)?;
    Ok(Json(TemperatureResponse { temperature_f }))
}

/// `POST /cascade` → 202; steps fire on later ticks.
pub async fn start_cascade(
    State(sim): State<SharedSimulation>,
    Json(req): Json<StartCascadeRequest>,
) -> Result<StatusCode, ApiError> {
    let step_delay = Duration::try_from_secs_f64(req.step_delay_s).map_err(|_| {
        GridError::InvalidArgument(format!(
            "step_delay_s must be a non-negative number of seconds, got {}",
            req.step_delay_s
        ))
    })?;
    sim.lock().start_cascade(req.order, step_delay, req.survivor)?;
    Ok(StatusCode::ACCEPTED)
}

/// `DELETE /cascade` → 202; the cascade stops on the next tick.
pub async fn cancel_cascade(State(sim): State<SharedSimulation>) -> Result<StatusCode, ApiError> {
    sim.lock().cancel_cascade()?;
    Ok(StatusCode::ACCEPTED)
}

/// `POST /scenarios/v2g-demo` → 201 with the demonstration session.
pub async fn run_v2g_demo(
    State(sim): State<SharedSimulation>,
    Json(req): Json<V2gDemoRequest>,
) -> Result<(StatusCode, Json<V2gSession>), ApiError> {
    let mut sim = sim.lock();
    sim.run_v2g_demo(&req.substation, req.target_kwh)?;
    let session = sim
        .dispatcher()
        .session(&req.substation)
        .cloned()
        .ok_or_else(|| GridError::NoActiveSession(req.substation.clone()))?;
    Ok((StatusCode::CREATED, Json(session)))
}
