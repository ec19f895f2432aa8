//! TTS Adapters - 各类合成 provider 实现
//!
//! `build_provider` 根据配置项构造 provider 客户端和对应的描述符

mod browser;
mod elevenlabs;
mod fake;
mod http_provider;
mod openai;

pub use browser::BrowserProvider;
pub use elevenlabs::{ElevenLabsConfig, ElevenLabsProvider, DEFAULT_ELEVENLABS_API_URL};
pub use fake::{FakeProvider, FakeProviderConfig};
pub use http_provider::{HttpProvider, HttpProviderConfig};
pub use openai::{OpenAiConfig, OpenAiProvider, DEFAULT_OPENAI_API_URL};

use reqwest::header::CONTENT_TYPE;
use reqwest::Response;
use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{ProviderError, TtsProviderPort};
use crate::config::ProviderConfig;
use crate::domain::provider::{ProviderDescriptor, ProviderKind};

/// reqwest 发送错误归类
pub(crate) fn map_send_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else if e.is_connect() {
        ProviderError::NetworkError(format!("Connection failed: {}", e))
    } else {
        ProviderError::NetworkError(e.to_string())
    }
}

pub(crate) async fn read_error_body(response: Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string())
}

pub(crate) fn content_type_of(response: &Response, default: &str) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// 根据配置构造 provider
pub fn build_provider(
    config: &ProviderConfig,
) -> Result<(ProviderDescriptor, Arc<dyn TtsProviderPort>), ProviderError> {
    let descriptor = ProviderDescriptor::new(&config.name, config.kind)
        .with_priority(config.priority)
        .with_max_text_length(config.max_text_length)
        .with_max_attempts(config.max_attempts)
        .with_call_timeout(Duration::from_secs(config.timeout_secs));

    let missing = |field: &str| {
        ProviderError::InvalidRequest(format!("provider '{}' requires {}", config.name, field))
    };

    let client: Arc<dyn TtsProviderPort> = match config.kind {
        ProviderKind::ElevenLabs => {
            let api_key = config.api_key.clone().ok_or_else(|| missing("api_key"))?;
            let voice = config.voice.clone().ok_or_else(|| missing("voice"))?;
            let mut eleven = ElevenLabsConfig::new(&config.name, api_key, voice);
            if let Some(url) = &config.base_url {
                eleven.base_url = url.trim_end_matches('/').to_string();
            }
            if let Some(model) = &config.model {
                eleven.model = model.clone();
            }
            eleven.timeout_secs = config.timeout_secs;
            Arc::new(ElevenLabsProvider::new(eleven)?)
        }
        ProviderKind::OpenAi => {
            let api_key = config.api_key.clone().ok_or_else(|| missing("api_key"))?;
            let mut openai = OpenAiConfig::new(&config.name, api_key);
            if let Some(url) = &config.base_url {
                openai.base_url = url.trim_end_matches('/').to_string();
            }
            if let Some(model) = &config.model {
                openai.model = model.clone();
            }
            if let Some(voice) = &config.voice {
                openai.default_voice = voice.clone();
            }
            openai.timeout_secs = config.timeout_secs;
            Arc::new(OpenAiProvider::new(openai)?)
        }
        ProviderKind::Http => {
            let base_url = config.base_url.clone().ok_or_else(|| missing("base_url"))?;
            let mut http = HttpProviderConfig::new(base_url).with_timeout(config.timeout_secs);
            if let Some(path) = &config.path {
                http.path = path.clone();
            }
            http.api_key = config.api_key.clone();
            Arc::new(HttpProvider::new(http)?)
        }
        ProviderKind::Browser => Arc::new(BrowserProvider::new(&config.name)),
        ProviderKind::Fake => {
            let mut fake = FakeProviderConfig::new(&config.name);
            fake.latency = Duration::from_millis(config.latency_ms);
            Arc::new(FakeProvider::new(fake))
        }
    };

    Ok((descriptor, client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_descriptor_from_config() {
        let mut config = ProviderConfig::new("custom", ProviderKind::Http);
        config.base_url = Some("http://tts.local".to_string());
        config.priority = 7;
        config.max_attempts = 2;
        config.timeout_secs = 12;

        let (descriptor, _) = build_provider(&config).unwrap();
        assert_eq!(descriptor.name, "custom");
        assert_eq!(descriptor.priority, 7);
        assert_eq!(descriptor.max_attempts, 2);
        assert_eq!(descriptor.call_timeout, Duration::from_secs(12));
        assert!(descriptor.network_reachable);
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let config = ProviderConfig::new("eleven", ProviderKind::ElevenLabs);
        assert!(build_provider(&config).is_err());

        let config = ProviderConfig::new("http", ProviderKind::Http);
        assert!(build_provider(&config).is_err());
    }

    #[test]
    fn test_browser_descriptor_unreachable() {
        let config = ProviderConfig::new("web-speech", ProviderKind::Browser);
        let (descriptor, _) = build_provider(&config).unwrap();
        assert!(!descriptor.network_reachable);
    }
}
