pub mod matches;
pub mod mutations;
pub mod status;
pub mod ws;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(matches::router())
        .merge(mutations::router())
        .merge(status::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    driver_id: Option<String>,
    matches: usize,
    working_set_version: u64,
    new_matches: usize,
    updating: usize,
    location_known: bool,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let coordinator = &state.coordinator;
    let snapshot = coordinator.status();

    Json(HealthResponse {
        status: "ok",
        driver_id: coordinator.driver_id().map(str::to_string),
        matches: coordinator.working_set().len(),
        working_set_version: snapshot.working_set_version,
        new_matches: snapshot.new_matches.len(),
        updating: snapshot.updating.len(),
        location_known: coordinator.location().last_known().is_some(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
