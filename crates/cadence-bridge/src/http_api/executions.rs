//! `/executions/*`: read-only access to execution state and logs.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use cadence_auth::middleware::AuthenticatedUser;
use cadence_core::error::CoreError;
use cadence_core::types::Execution;
use uuid::Uuid;

use crate::api_error::ApiError;
use crate::http_api::state::ApiState;

pub async fn get(
    State(state): State<ApiState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Path(execution_id): Path<Uuid>,
) -> Result<Json<Execution>, ApiError> {
    let execution = state
        .store
        .get_execution(execution_id)
        .await?
        .ok_or_else(|| CoreError::not_found("execution"))?;
    if execution.user_id != user_id {
        return Err(CoreError::Authorization.into());
    }
    Ok(Json(execution))
}

pub async fn logs(
    State(state): State<ApiState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Path(execution_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let execution = state
        .store
        .get_execution(execution_id)
        .await?
        .ok_or_else(|| CoreError::not_found("execution"))?;
    if execution.user_id != user_id {
        return Err(CoreError::Authorization.into());
    }
    Ok(Json(serde_json::json!(execution.agent_logs)))
}
