//! API request, response, and error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::error::GridError;
use crate::sim::substation::Status;

/// Body of `POST /substations/{id}/v2g`.
#[derive(Debug, Deserialize)]
pub struct EnableV2gRequest {
    pub target_kwh: f64,
}

/// Body of `POST /time`.
#[derive(Debug, Deserialize)]
pub struct SetTimeRequest {
    pub hour: i64,
}

/// Body of `POST /temperature`.
#[derive(Debug, Deserialize)]
pub struct SetTemperatureRequest {
    pub temperature_f: f64,
}

/// Body of `POST /cascade`.
#[derive(Debug, Deserialize)]
pub struct StartCascadeRequest {
    pub order: Vec<String>,
    #[serde(default = "default_step_delay_s")]
    pub step_delay_s: f64,
    #[serde(default)]
    pub survivor: Option<String>,
}

fn default_step_delay_s() -> f64 {
    30.0
}

/// Body of `POST /scenarios/v2g-demo`.
#[derive(Debug, Deserialize)]
pub struct V2gDemoRequest {
    pub substation: String,
    pub target_kwh: f64,
}

/// Response of the fail and restore commands.
#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub substation_id: String,
    pub status: Status,
}

#[derive(Debug, Serialize)]
pub struct TimeResponse {
    pub hour: u8,
}

#[derive(Debug, Serialize)]
pub struct TemperatureResponse {
    pub temperature_f: f64,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}

/// A rejected command, rendered as a status code plus [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiError(pub GridError);

impl From<GridError> for ApiError {
    fn from(err: GridError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            GridError::InvalidSubstationId(_) => StatusCode::NOT_FOUND,
            GridError::AlreadyFailed(_)
            | GridError::AlreadyOperational(_)
            | GridError::ConflictActiveScenario { .. }
            | GridError::SessionAlreadyActive(_)
            | GridError::NoActiveSession(_)
            | GridError::NoActiveCascade
            | GridError::NotLockOwner { .. } => StatusCode::CONFLICT,
            GridError::NotFailed(_)
            | GridError::InsufficientAssets(_)
            | GridError::InvalidArgument(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        (
            code,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_status_codes() {
        let cases = [
            (GridError::InvalidSubstationId("x".into()), StatusCode::NOT_FOUND),
            (GridError::AlreadyFailed("x".into()), StatusCode::CONFLICT),
            (
                GridError::ConflictActiveScenario {
                    held_by: "blackout_cascade".into(),
                },
                StatusCode::CONFLICT,
            ),
            (GridError::NoActiveCascade, StatusCode::CONFLICT),
            (GridError::NotFailed("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (
                GridError::InvalidArgument("bad".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(ApiError(err).status_code(), code);
        }
    }

    #[test]
    fn cascade_request_defaults() {
        let req: Result<StartCascadeRequest, _> = serde_json::from_str(r#"{"order":["a","b"]}"#);
        let req = req.ok();
        assert_eq!(req.as_ref().map(|r| r.order.len()), Some(2));
        assert_eq!(req.as_ref().map(|r| r.step_delay_s), Some(30.0));
        assert!(req.is_some_and(|r| r.survivor.is_none()));
    }
}
