//! Final resolve endpoint.

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use tracing::info;

use crate::api::{ResolveFinalRequest, ResolveFinalResponse};
use crate::rest::error::ApiError;
use crate::rest::state::ApiState;

/// Resolve a session into its record id; repeated calls return the same id
pub async fn resolve(
    State(state): State<ApiState>,
    payload: Result<Json<ResolveFinalRequest>, JsonRejection>,
) -> Result<Json<ResolveFinalResponse>, ApiError> {
    let Json(request) = payload?;

    let mut sessions = state.sessions.write().await;
    let session = sessions
        .get_mut(&request.session_id)
        .ok_or_else(|| ApiError::NotFound(format!("unknown session '{}'", request.session_id)))?;

    let record_id = session
        .record_id
        .get_or_insert_with(ApiState::new_record_id)
        .clone();

    info!(session_id = %request.session_id, record_id = %record_id, "Session resolved");
    Ok(Json(ResolveFinalResponse { record_id }))
}
