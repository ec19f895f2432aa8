//! Browser Provider
//!
//! 浏览器内置语音引擎只在客户端可用。注册它是为了让调用方能在偏好中点名，
//! 服务端不会选中它；万一被直接调用也只返回 permanent 错误。

use async_trait::async_trait;

use crate::application::ports::{ProviderError, SynthesisOutput, TtsProviderPort};
use crate::domain::job::VoiceOptions;

pub struct BrowserProvider {
    name: String,
}

impl BrowserProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl TtsProviderPort for BrowserProvider {
    async fn synthesize(
        &self,
        _text: &str,
        _options: &VoiceOptions,
    ) -> Result<SynthesisOutput, ProviderError> {
        Err(ProviderError::Unreachable(self.name.clone()))
    }

    async fn health_check(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_always_unreachable() {
        let provider = BrowserProvider::new("web-speech");
        let err = provider.synthesize("hi", &VoiceOptions::new()).await.unwrap_err();
        assert!(!err.is_transient());
        assert!(!provider.health_check().await);
        assert!(provider.voices().await.unwrap().is_empty());
    }
}
