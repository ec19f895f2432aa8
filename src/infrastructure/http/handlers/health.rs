//! Health / Admin Handlers

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::application::{AdminStats, HealthSnapshot};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

/// 健康快照，不健康时返回 503，响应体相同
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthSnapshot>) {
    let snapshot = state.health.snapshot().await;
    let status = if snapshot.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(snapshot))
}

/// 管理统计，鉴权由 require_admin 中间件完成
pub async fn admin_stats(State(state): State<Arc<AppState>>) -> Result<Json<AdminStats>, ApiError> {
    Ok(Json(state.health.admin_stats().await?))
}
