//! Provider Context - 描述符

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// provider 类型（封闭集合）
///
/// 新增 provider 需要同时新增变体和对应的适配器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    ElevenLabs,
    OpenAi,
    /// 通用 JSON -> 音频 HTTP 接口
    Http,
    /// 仅在浏览器中可用的引擎，服务端不可达
    Browser,
    /// 本地生成静音 WAV，用于开发与测试
    Fake,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::ElevenLabs => "elevenlabs",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Http => "http",
            ProviderKind::Browser => "browser",
            ProviderKind::Fake => "fake",
        }
    }

    /// 服务端能否直接调用
    pub fn network_reachable(&self) -> bool {
        !matches!(self, ProviderKind::Browser)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// provider 描述符
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    /// 注册名，调用方通过它指定 provider
    pub name: String,
    pub kind: ProviderKind,
    /// 数值越小越优先
    pub priority: u32,
    /// 单次请求允许的最大字符数
    pub max_text_length: usize,
    pub supports_voice_options: bool,
    pub network_reachable: bool,
    /// 单个 job 在该 provider 上的调用上限（含首次）
    pub max_attempts: u32,
    pub call_timeout: Duration,
}

impl ProviderDescriptor {
    pub fn new(name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            name: name.into(),
            kind,
            priority: 100,
            max_text_length: 5000,
            supports_voice_options: true,
            network_reachable: kind.network_reachable(),
            max_attempts: 3,
            call_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_max_text_length(mut self, max_text_length: usize) -> Self {
        self.max_text_length = max_text_length;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_voice_options(mut self, supported: bool) -> Self {
        self.supports_voice_options = supported;
        self
    }

    /// 能否承接这段文本
    pub fn accepts(&self, text_len: usize) -> bool {
        self.network_reachable && text_len <= self.max_text_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_is_unreachable() {
        let browser = ProviderDescriptor::new("web-speech", ProviderKind::Browser);
        assert!(!browser.network_reachable);
        assert!(!browser.accepts(1));

        let http = ProviderDescriptor::new("custom", ProviderKind::Http).with_max_text_length(10);
        assert!(http.accepts(10));
        assert!(!http.accepts(11));
    }

    #[test]
    fn test_max_attempts_at_least_one() {
        let d = ProviderDescriptor::new("a", ProviderKind::Fake).with_max_attempts(0);
        assert_eq!(d.max_attempts, 1);
    }
}
