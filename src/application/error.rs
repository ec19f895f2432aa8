//! 应用层错误定义
//!
//! 统一的命令/查询错误类型

use thiserror::Error;

use crate::application::ports::{
    IdempotencyError, ProviderError, QueueError, RepositoryError, StorageError,
};
use crate::domain::job::{JobStateError, ValidationError};

/// 应用层错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 资源未找到
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// 请求校验失败，不入队也不重试
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// 状态不允许该操作
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// 队列不可用，提交直接失败
    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    /// 仓储错误
    #[error("Repository error: {0}")]
    RepositoryError(String),

    /// 外部服务错误
    #[error("External service error: {0}")]
    ExternalServiceError(String),

    /// 存储错误
    #[error("Storage error: {0}")]
    StorageError(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ApplicationError {
    /// 创建 NotFound 错误
    pub fn not_found(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    /// 创建状态无效错误
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(err: RepositoryError) -> Self {
        Self::RepositoryError(err.to_string())
    }
}

impl From<JobStateError> for ApplicationError {
    fn from(err: JobStateError) -> Self {
        Self::InvalidState(err.to_string())
    }
}

impl From<QueueError> for ApplicationError {
    fn from(err: QueueError) -> Self {
        Self::QueueUnavailable(err.to_string())
    }
}

impl From<IdempotencyError> for ApplicationError {
    fn from(err: IdempotencyError) -> Self {
        Self::RepositoryError(err.to_string())
    }
}

impl From<StorageError> for ApplicationError {
    fn from(err: StorageError) -> Self {
        Self::StorageError(err.to_string())
    }
}

impl From<ProviderError> for ApplicationError {
    fn from(err: ProviderError) -> Self {
        Self::ExternalServiceError(err.to_string())
    }
}
