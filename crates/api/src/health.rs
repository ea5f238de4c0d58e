//! Health check.

use axum::{Json, extract::State};
use coachline_common::AppResult;
use serde_json::{Value, json};

use crate::state::AppState;

/// `GET /health`: 200 when the database answers.
pub async fn health(State(state): State<AppState>) -> AppResult<Json<Value>> {
    coachline_db::ping(&state.db).await?;
    Ok(Json(json!({ "status": "ok" })))
}
