use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::gateway::MatchList;
use crate::models::Match;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/matches", get(list_matches))
        .route("/matches/:id", get(get_match))
        .route("/matches/:id/refresh", post(refresh_match))
        .route("/sync/:list", post(sync_list))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub filter: Option<String>,
}

async fn list_matches(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Match>>, AppError> {
    let coordinator = &state.coordinator;
    let matches = match query.filter.as_deref().unwrap_or("all") {
        "all" => coordinator.working_set().iter().cloned().collect(),
        "live" => coordinator.live(),
        "complete" => coordinator.complete(),
        "available" => coordinator.available(),
        "en_route" => coordinator.en_route(),
        "missed" => coordinator.missed_matches().iter().cloned().collect(),
        other => return Err(AppError::BadRequest(format!("unknown filter {other:?}"))),
    };

    Ok(Json(matches.iter().map(|m| (**m).clone()).collect()))
}

async fn get_match(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Match>, AppError> {
    let m = state
        .coordinator
        .find(&id)
        .ok_or_else(|| AppError::NotFound(format!("match {id} not found")))?;

    Ok(Json((*m).clone()))
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub removed: bool,
    #[serde(rename = "match")]
    pub refreshed: Option<Match>,
}

async fn refresh_match(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RefreshResponse>, AppError> {
    let refreshed = state.coordinator.fetch_match(&id).await?;

    Ok(Json(RefreshResponse {
        removed: refreshed.is_none(),
        refreshed: refreshed.map(|m| (*m).clone()),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncQuery {
    /// Completed history only: fetch the next page instead of restarting.
    #[serde(default)]
    pub more: bool,
}

#[derive(Serialize)]
pub struct SyncResponse {
    pub list: MatchList,
    pub fetched: usize,
}

async fn sync_list(
    State(state): State<Arc<AppState>>,
    Path(list): Path<String>,
    Query(query): Query<SyncQuery>,
) -> Result<Json<SyncResponse>, AppError> {
    let list = MatchList::parse(&list)
        .ok_or_else(|| AppError::BadRequest(format!("unknown list {list:?}")))?;

    let fetched = match list {
        MatchList::Completed if query.more => state.coordinator.refresh_completed(false).await?,
        _ => state.coordinator.refresh(list).await?,
    };

    Ok(Json(SyncResponse { list, fetched }))
}
