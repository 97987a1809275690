//! `/agent-configs/*`: read and replace a user's default config per role.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use cadence_auth::middleware::AuthenticatedUser;
use cadence_core::error::CoreError;
use cadence_core::types::{AgentConfig, AgentRole, ModelProvider};
use serde::Deserialize;

use crate::api_error::ApiError;
use crate::http_api::state::ApiState;

#[derive(Deserialize)]
pub struct UpdateAgentConfigRequest {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

pub async fn get(
    State(state): State<ApiState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Path(role): Path<String>,
) -> Result<Json<AgentConfig>, ApiError> {
    let role = AgentRole::parse(&role)?;
    let config = state
        .store
        .get_default_agent_config(user_id, role)
        .await?
        .ok_or_else(|| CoreError::not_found("agent_config"))?;
    Ok(Json(config))
}

pub async fn put(
    State(state): State<ApiState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Path(role): Path<String>,
    Json(req): Json<UpdateAgentConfigRequest>,
) -> Result<Json<AgentConfig>, ApiError> {
    let role = AgentRole::parse(&role)?;
    let provider = ModelProvider::parse(&req.provider)?;

    let mut config = state
        .store
        .get_default_agent_config(user_id, role)
        .await?
        .unwrap_or_else(|| AgentConfig::new(user_id, role, provider, req.model.clone()));

    config.provider = provider;
    config.model = req.model;
    config.default = true;
    if let Some(temperature) = req.temperature {
        config.temperature = temperature;
    }
    if let Some(max_tokens) = req.max_tokens {
        config.max_tokens = max_tokens;
    }
    if req.system_prompt.is_some() {
        config.system_prompt = req.system_prompt;
    }

    config
        .validate()
        .map_err(|e| CoreError::validation("agent_config", e.to_string()))?;

    state.store.upsert_agent_config(&config).await?;
    Ok(Json(config))
}

