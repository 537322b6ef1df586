use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};

use crate::engine::StatusSnapshot;
use crate::error::AppError;
use crate::geo::DriverLocation;
use crate::models::Match;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(status))
        .route("/new-matches", get(new_matches))
        .route("/new-matches/viewed", post(matches_viewed))
        .route("/location", post(report_location))
        .route("/session/sign-out", post(sign_out))
}

/// Records a shell-provided fix for both the tracker and any pending
/// location request.
pub(crate) fn accept_location(state: &AppState, location: DriverLocation) -> Result<(), AppError> {
    if !(-90.0..=90.0).contains(&location.lat) || !(-180.0..=180.0).contains(&location.lng) {
        return Err(AppError::BadRequest("coordinates out of range".to_string()));
    }

    state.coordinator.location().record(location);
    state.reporter.report(location);
    Ok(())
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusSnapshot> {
    Json(state.coordinator.status())
}

async fn new_matches(State(state): State<Arc<AppState>>) -> Json<Vec<Match>> {
    let fresh = state.coordinator.new_matches();
    Json(fresh.iter().map(|m| (**m).clone()).collect())
}

async fn matches_viewed(State(state): State<Arc<AppState>>) -> StatusCode {
    state.coordinator.matches_viewed();
    StatusCode::NO_CONTENT
}

async fn report_location(
    State(state): State<Arc<AppState>>,
    Json(location): Json<DriverLocation>,
) -> Result<StatusCode, AppError> {
    accept_location(&state, location)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn sign_out(State(state): State<Arc<AppState>>) -> StatusCode {
    state.coordinator.sign_out();
    StatusCode::NO_CONTENT
}
