//! Job Queries

/// 查询 job 状态
#[derive(Debug, Clone)]
pub struct GetJob {
    pub job_id: String,
}
