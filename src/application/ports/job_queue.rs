//! Job Queue Port - 持久化任务队列
//!
//! 至少一次投递：出队后在 lease 期内不可见，未 ack 的 lease 过期后重新投递

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::job::Priority;

/// 队列错误
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    #[error("Lease not found or expired: {0}")]
    LeaseNotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// 出队得到的租约
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLease {
    pub job_id: String,
    /// 每次投递生成新的 token，旧 token 无法 ack
    pub token: String,
    /// 第几次投递（从 1 开始）
    pub deliveries: u32,
    pub priority: Priority,
}

/// 队列快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    /// 等待中（含 lease 已过期待重投的条目）
    pub waiting: u64,
    /// lease 有效的条目
    pub active: u64,
    /// 终态失败计数
    pub failed: u64,
}

/// Job Queue Port
#[async_trait]
pub trait JobQueuePort: Send + Sync {
    async fn enqueue(&self, job_id: &str, priority: Priority) -> Result<(), QueueError>;

    /// 阻塞直到有可用条目
    ///
    /// 取消安全：future 被丢弃时不会占用任何条目
    async fn dequeue(&self) -> Result<JobLease, QueueError>;

    /// 处理完成，删除条目
    async fn ack(&self, lease: &JobLease) -> Result<(), QueueError>;

    /// 终态失败，删除条目并计入 failed
    async fn fail(&self, lease: &JobLease) -> Result<(), QueueError>;

    /// 移除未被租用的条目，返回是否移除
    async fn cancel(&self, job_id: &str) -> Result<bool, QueueError>;

    async fn snapshot(&self) -> Result<QueueSnapshot, QueueError>;

    async fn ping(&self) -> Result<(), QueueError>;
}
