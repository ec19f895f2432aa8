//! Job Repository Port - 出站端口
//!
//! Job 记录的持久化，具体实现在 infrastructure 层（SQLite）

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::job::{Job, JobStatus};

/// Repository 错误
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Duplicate entity: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Job Repository Port
#[async_trait]
pub trait JobRepositoryPort: Send + Sync {
    async fn insert(&self, job: &Job) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Job>, RepositoryError>;

    /// 覆盖写入
    ///
    /// 已处于终态的记录不会被修改，此时返回 false
    async fn update(&self, job: &Job) -> Result<bool, RepositoryError>;

    /// 各状态的 job 数量
    async fn count_by_status(&self) -> Result<Vec<(JobStatus, u64)>, RepositoryError>;
}
