//! Health check endpoint

use axum::{Json, extract::State};

use crate::api::{error::ApiResult, state::ApiState, types::HealthResponse};

/// GET /api/v1/health
///
/// Reports inventory size and live subscriber count; fails with 500 when the
/// inventory cannot be read.
pub async fn health_check(State(state): State<ApiState>) -> ApiResult<Json<HealthResponse>> {
    let hosts = state.storage.inventory.list_hosts().await?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        hosts: hosts.len(),
        subscribers: state.hub.subscriber_count().await,
    }))
}
