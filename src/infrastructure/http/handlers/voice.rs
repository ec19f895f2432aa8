//! Voice Handlers

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use std::sync::Arc;

use crate::application::ListVoices;
use crate::infrastructure::http::dto::{VoicesQuery, VoicesResponse};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

/// 音色目录，`?provider=` 只查询单个 provider
pub async fn list_voices(
    State(state): State<Arc<AppState>>,
    query: Result<Query<VoicesQuery>, QueryRejection>,
) -> Result<Json<VoicesResponse>, ApiError> {
    let Query(query) = query?;
    let voices = state
        .list_voices_handler
        .handle(ListVoices {
            provider: query.provider.filter(|name| !name.is_empty()),
        })
        .await?;
    Ok(Json(VoicesResponse { voices }))
}
