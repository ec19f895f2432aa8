//! TTS Provider Port - 合成后端抽象
//!
//! 所有 provider 对外只暴露统一的 synthesize 接口，具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::job::VoiceOptions;

/// provider 错误
///
/// 分为 transient（可重试，计入熔断）和 permanent（换下一个 provider）两类
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Voice not found: {0}")]
    VoiceNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Provider not reachable from server: {0}")]
    Unreachable(String),
}

impl ProviderError {
    /// 是否值得在同一 provider 上重试
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::NetworkError(_)
                | ProviderError::Timeout
                | ProviderError::RateLimited(_)
                | ProviderError::ServiceError(_)
                | ProviderError::InvalidResponse(_)
        )
    }

    /// 按 HTTP 状态码分类
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = format!("HTTP {}: {}", status, truncate(body, 200));
        match status {
            401 | 403 => ProviderError::Unauthorized(detail),
            404 => ProviderError::VoiceNotFound(detail),
            408 => ProviderError::Timeout,
            429 => ProviderError::RateLimited(detail),
            500..=599 => ProviderError::ServiceError(detail),
            _ => ProviderError::InvalidRequest(detail),
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// 合成结果
#[derive(Debug, Clone)]
pub struct SynthesisOutput {
    pub audio_data: Vec<u8>,
    /// 例如 audio/mpeg、audio/wav
    pub content_type: String,
    /// 音频时长（毫秒），provider 不返回时为空
    pub duration_ms: Option<u64>,
}

/// 音色目录条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub provider: String,
}

/// TTS Provider Port
#[async_trait]
pub trait TtsProviderPort: Send + Sync {
    /// 合成一段文本
    async fn synthesize(
        &self,
        text: &str,
        options: &VoiceOptions,
    ) -> Result<SynthesisOutput, ProviderError>;

    /// 音色目录
    async fn voices(&self) -> Result<Vec<VoiceInfo>, ProviderError> {
        Ok(Vec::new())
    }

    /// 检查 provider 是否可用
    async fn health_check(&self) -> bool {
        true
    }
}
