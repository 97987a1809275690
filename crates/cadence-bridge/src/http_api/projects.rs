//! `/projects/*`: the thin CRUD + execute surface described in §6.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use cadence_auth::middleware::AuthenticatedUser;
use cadence_core::error::CoreError;
use cadence_core::types::{ExecutionType, Project};
use serde::Deserialize;
use uuid::Uuid;

use crate::api_error::ApiError;
use crate::http_api::state::ApiState;
use crate::workspace;

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub requirements: String,
}

#[derive(Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub requirements: Option<String>,
}

pub async fn create(
    State(state): State<ApiState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<Json<Project>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(CoreError::validation("name", "must not be empty").into());
    }

    let workspace_root = format!("/var/lib/cadence/workspaces/{}", Uuid::new_v4());
    workspace::ensure_layout(&workspace_root).await?;

    let project = Project::new(user_id, req.name, req.requirements, workspace_root);
    state.store.create_project(&project).await?;
    Ok(Json(project))
}

pub async fn get(
    State(state): State<ApiState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Project>, ApiError> {
    let project = state
        .store
        .get_project(project_id)
        .await?
        .ok_or_else(|| CoreError::not_found("project"))?;
    if project.owner_id != user_id {
        return Err(CoreError::Authorization.into());
    }
    Ok(Json(project))
}

pub async fn update(
    State(state): State<ApiState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<UpdateProjectRequest>,
) -> Result<Json<Project>, ApiError> {
    let mut project = state
        .store
        .get_project(project_id)
        .await?
        .ok_or_else(|| CoreError::not_found("project"))?;
    if project.owner_id != user_id {
        return Err(CoreError::Authorization.into());
    }

    if let Some(name) = req.name {
        project.name = name;
    }
    if let Some(description) = req.description {
        project.description = Some(description);
    }
    if let Some(requirements) = req.requirements {
        project.requirements = requirements;
    }

    state.store.update_project(&project).await?;
    Ok(Json(project))
}

pub async fn execute(
    State(state): State<ApiState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let project = state
        .store
        .get_project(project_id)
        .await?
        .ok_or_else(|| CoreError::not_found("project"))?;
    if project.owner_id != user_id {
        return Err(CoreError::Authorization.into());
    }

    let execution = cadence_core::types::Execution::new(project.id, user_id, ExecutionType::Full);
    state.store.create_execution(&execution).await?;

    let driver = state.driver.clone();
    let execution_id = execution.id;
    tokio::spawn(async move {
        if let Err(e) = driver.run(execution_id).await {
            tracing::error!(error = %e, "workflow run failed");
        }
    });

    Ok(Json(serde_json::json!({ "execution_id": execution.id })))
}
