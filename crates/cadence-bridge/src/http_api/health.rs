//! `/healthz` and `/readyz`: liveness is unconditional, readiness probes
//! the persistence and blacklist dependencies with a short budget.

use axum::{extract::State, http::StatusCode, Json};

use crate::http_api::state::ApiState;

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn metrics() -> String {
    cadence_telemetry::metrics::global_metrics().export_prometheus()
}

pub async fn readyz(State(state): State<ApiState>) -> (StatusCode, Json<serde_json::Value>) {
    let store_ready = matches!(
        tokio::time::timeout(
            std::time::Duration::from_millis(500),
            state.store.get_user(uuid::Uuid::nil()),
        )
        .await,
        Ok(Ok(_))
    );

    let blacklist_ready = tokio::time::timeout(
        std::time::Duration::from_millis(500),
        state.blacklist.is_token_revoked(uuid::Uuid::nil()),
    )
    .await
    .is_ok();

    let ready = store_ready && blacklist_ready;
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(serde_json::json!({ "store": store_ready, "blacklist": blacklist_ready })),
    )
}
