//! Step submit endpoint (upsert of a session).

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use chrono::Local;
use tracing::info;

use crate::api::{StepSubmitRequest, StepSubmitResponse};
use crate::rest::error::ApiError;
use crate::rest::state::ApiState;
use crate::steps::validation::validate_field;

/// Create a session (no id) or merge fields into an existing one, then narrow
pub async fn submit(
    State(state): State<ApiState>,
    payload: Result<Json<StepSubmitRequest>, JsonRejection>,
) -> Result<Json<StepSubmitResponse>, ApiError> {
    let Json(request) = payload?;

    if request.fields.is_empty() {
        return Err(ApiError::BadRequest("no fields submitted".to_string()));
    }
    let today = Local::now().date_naive();
    for (field, value) in &request.fields {
        validate_field(*field, Some(value), today)?;
    }

    let mut sessions = state.sessions.write().await;
    let session_id = match request.session_id {
        Some(id) if sessions.contains_key(&id) => id,
        Some(id) => return Err(ApiError::NotFound(format!("unknown session '{}'", id))),
        None => ApiState::new_session_id(),
    };

    let session = sessions.entry(session_id.clone()).or_default();
    session.fields.extend(request.fields.clone());
    let recommendations = state.narrow(session, &request.fields);

    info!(
        session_id = %session_id,
        fields = request.fields.len(),
        matches = recommendations.len(),
        "Step submitted"
    );

    Ok(Json(StepSubmitResponse {
        session_id,
        recommendations,
    }))
}
