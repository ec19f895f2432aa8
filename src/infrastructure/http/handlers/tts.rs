//! TTS Handlers - 提交、查询、取消

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::application::{CancelJobCommand, GetJob};
use crate::domain::job::JobStatus;
use crate::infrastructure::http::dto::{CancelResponse, GenerateRequest, GenerateResponse, JobResponse};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

/// 提交合成请求
///
/// 入队返回 202，inline 执行或命中已完成的 job 返回 200
pub async fn generate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<GenerateResponse>), ApiError> {
    let Json(req) = body?;
    let response = state.generate_handler.handle(req.into_command()).await?;

    let status = match response.status {
        JobStatus::Completed | JobStatus::Failed => StatusCode::OK,
        JobStatus::Pending | JobStatus::Queued | JobStatus::Processing => StatusCode::ACCEPTED,
    };
    Ok((status, Json(response.into())))
}

/// 查询 job 状态
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = state.get_job_handler.handle(GetJob { job_id }).await?;
    Ok(Json(job.into()))
}

/// 取消 job，已是终态时返回 409
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let response = state
        .cancel_handler
        .handle(CancelJobCommand { job_id })
        .await?;
    Ok(Json(response.into()))
}
