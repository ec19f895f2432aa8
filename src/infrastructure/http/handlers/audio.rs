//! Audio Handler - 签名 URL 的目标

use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::application::GetAudioQuery;
use crate::infrastructure::http::dto::AudioQuery;
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

pub async fn get_audio(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    query: Result<Query<AudioQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let result = state
        .get_audio_handler
        .handle(GetAudioQuery {
            key: key.trim_start_matches('/').to_string(),
            expires: query.expires,
            signature: query.signature,
        })
        .await?;

    let content_length = result.audio_data.len();
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, result.content_type),
            (header::CONTENT_LENGTH, content_length.to_string()),
            (header::CACHE_CONTROL, "private, max-age=300".to_string()),
        ],
        Body::from(result.audio_data),
    )
        .into_response())
}
