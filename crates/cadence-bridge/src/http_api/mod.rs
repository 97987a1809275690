//! The HTTP surface described in §6: intentionally thin, enough to admit
//! requests into the connection registry, event bus, and workflow driver.

pub mod agent_configs;
pub mod auth;
pub mod executions;
pub mod health;
pub mod projects;
pub mod state;
pub mod websocket;

use axum::routing::{get, post};
use axum::Router as AxumRouter;
use cadence_auth::middleware::AuthLayer;

pub use state::ApiState;

/// Build the full axum router. Routes that need an authenticated caller
/// are grouped under one `AuthLayer`-wrapped sub-router; the rest
/// (registration, login, health checks) stay open.
pub fn router(state: ApiState) -> AxumRouter {
    let auth_layer = AuthLayer::new(state.token_authority.clone(), state.blacklist.clone());

    let authenticated = AxumRouter::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/projects", post(projects::create))
        .route("/projects/{id}", get(projects::get).patch(projects::update))
        .route("/projects/{id}/execute", post(projects::execute))
        .route("/executions/{id}", get(executions::get))
        .route("/executions/{id}/logs", get(executions::logs))
        .route("/agent-configs/{role}", get(agent_configs::get).put(agent_configs::put))
        .layer(auth_layer)
        .with_state(state.clone());

    let public = AxumRouter::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(health::metrics))
        .route("/ws", get(websocket::global))
        .route("/ws/project/{project_id}", get(websocket::project_scoped))
        .route("/ws/execution/{execution_id}", get(websocket::execution_scoped))
        .with_state(state.clone());

    AxumRouter::new()
        .merge(public)
        .merge(authenticated)
        .layer(crate::rate_limit_middleware::RateLimitLayer::new(state.rate_limiter.clone()))
        .layer(axum::middleware::from_fn(cadence_telemetry::middleware::metrics_middleware))
        .layer(axum::middleware::from_fn(cadence_telemetry::middleware::request_id_middleware))
}
