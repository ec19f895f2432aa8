//! Idempotency Store Port - 请求去重
//!
//! fingerprint -> job_id 的映射，带 TTL

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::job::RequestFingerprint;

/// 幂等存储错误
#[derive(Debug, Error)]
pub enum IdempotencyError {
    /// 指纹已被其他 job 占用，携带当前持有者
    #[error("Fingerprint already reserved by job {0}")]
    AlreadyExists(String),

    /// 条目已过期但尚未删除，携带原持有者；是否接管由调用方按 job 状态决定
    #[error("Fingerprint reservation of job {0} has expired")]
    Expired(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Idempotency Store Port
///
/// reserve 必须是原子的：并发提交同一指纹时只有一个调用方成功。
/// 过期条目不会被 reserve 静默覆盖，只能通过 replace / release 按持有者接管或删除
#[async_trait]
pub trait IdempotencyStorePort: Send + Sync {
    /// 查询未过期的持有者
    async fn lookup(&self, fingerprint: &RequestFingerprint)
        -> Result<Option<String>, IdempotencyError>;

    /// 占用指纹，有效条目返回 AlreadyExists(持有者)，过期条目返回 Expired(持有者)
    async fn reserve(
        &self,
        fingerprint: &RequestFingerprint,
        job_id: &str,
    ) -> Result<(), IdempotencyError>;

    /// 仅当持有者仍为 expected_job_id 时替换为 new_job_id 并重新计算有效期
    ///
    /// new_job_id 与 expected_job_id 相同即为续期
    async fn replace(
        &self,
        fingerprint: &RequestFingerprint,
        expected_job_id: &str,
        new_job_id: &str,
    ) -> Result<(), IdempotencyError>;

    /// 仅当持有者为 job_id 时删除
    async fn release(
        &self,
        fingerprint: &RequestFingerprint,
        job_id: &str,
    ) -> Result<bool, IdempotencyError>;

    /// 列出最多 limit 个过期条目 (fingerprint, job_id)
    ///
    /// 是否删除取决于 job 是否已到终态，由调用方判断后 release 或续期
    async fn expired_entries(
        &self,
        limit: usize,
    ) -> Result<Vec<(RequestFingerprint, String)>, IdempotencyError>;
}
