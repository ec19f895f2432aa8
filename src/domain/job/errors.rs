//! Job Context - Errors

use thiserror::Error;

use super::JobStatus;

/// 请求校验错误
///
/// 只在请求边界产生，不会进入队列，也不会重试
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("text is empty after normalization")]
    EmptyText,

    #[error("text length {length} exceeds limit {max}")]
    TextTooLong { length: usize, max: usize },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("option `{name}` out of range: {value} not in [{min}, {max}]")]
    OptionOutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("invalid option `{name}`: {message}")]
    InvalidOption { name: String, message: String },
}

impl ValidationError {
    /// 机器可读的原因码
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::EmptyText => "empty_text",
            ValidationError::TextTooLong { .. } => "text_too_long",
            ValidationError::UnknownProvider(_) => "unknown_provider",
            ValidationError::OptionOutOfRange { .. } => "option_out_of_range",
            ValidationError::InvalidOption { .. } => "invalid_option",
        }
    }
}

/// Job 状态机错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobStateError {
    #[error("invalid transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("job cannot complete without a successful provider attempt")]
    MissingSuccessfulAttempt,
}
