use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::post;
use serde::Serialize;

use crate::engine::{MatchMutation, MutationTag};
use crate::error::AppError;
use crate::models::Match;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/matches/:id/mutations", post(apply_mutation))
}

#[derive(Serialize)]
pub struct MutationResponse {
    pub action: MutationTag,
    pub removed: bool,
    #[serde(rename = "match")]
    pub updated: Option<Match>,
}

async fn apply_mutation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(mutation): Json<MatchMutation>,
) -> Result<Json<MutationResponse>, AppError> {
    let action = mutation.tag();
    state.coordinator.apply(&id, mutation).await?;

    let updated = state.coordinator.find(&id).map(|m| (*m).clone());
    Ok(Json(MutationResponse {
        action,
        removed: updated.is_none(),
        updated,
    }))
}
