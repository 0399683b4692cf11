use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::error::ApiError;
use crate::extractors::{AppJson, LearnerId};
use crate::models::progress::SessionCountResponse;
use crate::models::{Exercise, ProgressSnapshot, VideoProgress};
use crate::services::AppState;
use crate::tracker::RequirementStatus;

async fn load_exercise(state: &AppState, exercise_id: &str) -> Result<Exercise, ApiError> {
    state
        .progress
        .exercise(exercise_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Exercise {} not found", exercise_id)))
}

/// GET /api/v1/exercises/{id}/progress
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    LearnerId(user_id): LearnerId,
    Path(exercise_id): Path<String>,
) -> Result<Json<VideoProgress>, ApiError> {
    let exercise = load_exercise(&state, &exercise_id).await?;

    state
        .progress
        .get_progress(&user_id, &exercise)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("No progress recorded for this exercise"))
}

/// PUT /api/v1/exercises/{id}/progress
pub async fn put_progress(
    State(state): State<Arc<AppState>>,
    LearnerId(user_id): LearnerId,
    Path(exercise_id): Path<String>,
    AppJson(snapshot): AppJson<ProgressSnapshot>,
) -> Result<Json<VideoProgress>, ApiError> {
    snapshot
        .validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    if snapshot.exercise_id != exercise_id {
        return Err(ApiError::bad_request(
            "exercise_id in body does not match the path",
        ));
    }

    let exercise = load_exercise(&state, &exercise_id).await?;
    let progress = state
        .progress
        .record_progress(&user_id, &exercise, &snapshot)
        .await?;

    Ok(Json(progress))
}

/// POST /api/v1/exercises/{id}/sessions
pub async fn complete_session(
    State(state): State<Arc<AppState>>,
    LearnerId(user_id): LearnerId,
    Path(exercise_id): Path<String>,
) -> Result<Json<SessionCountResponse>, ApiError> {
    let exercise = load_exercise(&state, &exercise_id).await?;
    let session_count = state.progress.complete_session(&user_id, &exercise).await?;

    Ok(Json(SessionCountResponse {
        exercise_id,
        session_count,
    }))
}

/// GET /api/v1/exercises/{id}/requirement
pub async fn get_requirement(
    State(state): State<Arc<AppState>>,
    LearnerId(user_id): LearnerId,
    Path(exercise_id): Path<String>,
) -> Result<Json<RequirementStatus>, ApiError> {
    let exercise = load_exercise(&state, &exercise_id).await?;
    let status = state.progress.requirement(&user_id, &exercise).await?;

    Ok(Json(status))
}
