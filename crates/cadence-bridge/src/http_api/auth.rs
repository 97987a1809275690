//! `/auth/*`: register, login, refresh, logout, and the current-user probe.

use axum::{extract::State, Extension, Json};
use cadence_auth::middleware::AuthenticatedUser;
use cadence_auth::password::{hash_password, verify_password};
use cadence_auth::token::{Claims, TokenKind};
use cadence_core::error::CoreError;
use cadence_core::types::User;
use serde::{Deserialize, Serialize};

use crate::api_error::ApiError;
use crate::http_api::state::ApiState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub all_sessions: bool,
}

#[derive(Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Serialize)]
pub struct UserProfile {
    pub id: uuid::Uuid,
    pub email: String,
    pub username: String,
    pub active: bool,
    pub superuser: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            active: user.active,
            superuser: user.superuser,
            created_at: user.created_at,
        }
    }
}

pub async fn register(
    State(state): State<ApiState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    if state.store.get_user_by_email(&req.email).await?.is_some() {
        return Err(CoreError::Conflict("email already registered".into()).into());
    }

    let password_hash = hash_password(req.password, state.argon2_memory_kib)
        .await
        .map_err(|e| CoreError::Auth(e.to_string()))?;
    let user = User::new(req.email, req.username, password_hash);
    state.store.create_user(&user).await?;

    Ok(Json(issue_pair(&state, user.id)))
}

pub async fn login(
    State(state): State<ApiState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let user = state
        .store
        .get_user_by_email(&req.email)
        .await?
        .ok_or_else(|| CoreError::Auth("invalid credentials".into()))?;

    let ok = verify_password(req.password, user.password_hash.clone(), state.argon2_memory_kib)
        .await
        .map_err(|e| CoreError::Auth(e.to_string()))?;
    if !ok || !user.active {
        return Err(CoreError::Auth("invalid credentials".into()).into());
    }

    Ok(Json(issue_pair(&state, user.id)))
}

pub async fn refresh(
    State(state): State<ApiState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let claims = state
        .token_authority
        .verify(&req.refresh_token, TokenKind::Refresh)
        .map_err(|e| CoreError::Auth(e.to_string()))?;

    if state.blacklist.is_token_revoked(claims.jti).await || state.blacklist.is_user_revoked(claims.sub).await {
        return Err(CoreError::Auth("refresh token revoked".into()).into());
    }

    Ok(Json(issue_pair(&state, claims.sub)))
}

pub async fn logout(
    State(state): State<ApiState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<LogoutRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let remaining = (claims.exp - chrono::Utc::now().timestamp()).max(1) as u64;
    state
        .blacklist
        .revoke_token(claims.jti, std::time::Duration::from_secs(remaining))
        .await
        .map_err(|e| CoreError::Storage(e.to_string()))?;

    if req.all_sessions {
        let refresh_ttl = std::time::Duration::from_secs(state.token_authority.refresh_ttl_seconds() as u64);
        state
            .blacklist
            .revoke_all_for_user(user_id, refresh_ttl)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;
    }
    Ok(Json(serde_json::json!({ "logged_out": true })))
}

pub async fn me(
    State(state): State<ApiState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
) -> Result<Json<UserProfile>, ApiError> {
    let user = state
        .store
        .get_user(user_id)
        .await?
        .ok_or_else(|| CoreError::not_found("user"))?;
    Ok(Json(user.into()))
}

fn issue_pair(state: &ApiState, user_id: uuid::Uuid) -> TokenPair {
    let access = state.token_authority.issue_access(user_id);
    let refresh = state.token_authority.issue_refresh(user_id);
    TokenPair {
        access_token: access.token,
        refresh_token: refresh.token,
        expires_in: state.token_authority.access_ttl_seconds(),
    }
}
