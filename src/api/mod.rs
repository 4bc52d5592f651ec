//! REST API over a running simulation.
//!
//! Read endpoint:
//! - `GET /snapshot`: grid state as of the last tick
//!
//! Command endpoints map one-to-one onto [`Simulation`](crate::sim::Simulation)
//! commands. Rejected commands answer 404 (unknown substation), 409
//! (conflicting scenario or state), or 422 (invalid argument) with a JSON
//! `{ "error": ... }` body.

mod handlers;
mod types;

use std::net::SocketAddr;

use axum::Router;
use axum::routing::{get, post};
use tracing::info;

use crate::sim::SharedSimulation;

pub use types::{ApiError, ErrorResponse};

/// Builds the axum router with all API routes.
///
/// # Arguments
///
/// * `sim` - Simulation shared with the ticker
///
/// # Returns
///
/// Configured `Router` ready to serve.
pub fn router(sim: SharedSimulation) -> Router {
    Router::new()
        .route("/snapshot", get(handlers::get_snapshot))
        .route("/substations/{id}/status", get(handlers::get_status))
        .route("/substations/{id}/fail", post(handlers::fail))
        .route("/substations/{id}/restore", post(handlers::restore))
        .route(
            "/substations/{id}/v2g",
            post(handlers::enable_v2g).delete(handlers::disable_v2g),
        )
        .route("/time", post(handlers::set_time))
        .route("/temperature", post(handlers::set_temperature))
        .route(
            "/cascade",
            post(handlers::start_cascade).delete(handlers::cancel_cascade),
        )
        .route("/scenarios/v2g-demo", post(handlers::run_v2g_demo))
        .with_state(sim)
}

/// Binds to the given address and serves the API until the process exits.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind or the server fails.
pub async fn serve(sim: SharedSimulation, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(sim);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
