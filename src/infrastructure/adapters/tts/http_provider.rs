//! HTTP TTS Provider - 通用 JSON -> 音频接口
//!
//! POST {base_url}{path}
//! Request: {"text": "...", "voice_id": "...", "language": "...", "options": {...}}  (JSON)
//! Response: 音频二进制，元数据在 headers 中

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{content_type_of, map_send_error, read_error_body};
use crate::application::ports::{ProviderError, SynthesisOutput, TtsProviderPort};
use crate::domain::job::VoiceOptions;

/// 请求体 (JSON)
#[derive(Debug, Serialize)]
struct HttpSynthesisRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
    #[serde(skip_serializing_if = "VoiceOptions::is_empty")]
    options: &'a VoiceOptions,
}

/// HTTP provider 配置
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// 服务基础 URL
    pub base_url: String,
    /// 合成接口路径
    pub path: String,
    /// 可选的 Bearer token
    pub api_key: Option<String>,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            path: "/api/tts/infer".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl HttpProviderConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// 通用 HTTP provider
pub struct HttpProvider {
    client: Client,
    config: HttpProviderConfig,
}

impl HttpProvider {
    pub fn new(config: HttpProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn synthesize_url(&self) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), self.config.path)
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl TtsProviderPort for HttpProvider {
    async fn synthesize(
        &self,
        text: &str,
        options: &VoiceOptions,
    ) -> Result<SynthesisOutput, ProviderError> {
        let body = HttpSynthesisRequest {
            text,
            voice_id: options.voice_id(),
            language: options.language(),
            options,
        };

        tracing::debug!(url = %self.synthesize_url(), text_len = text.len(), "Sending TTS request");

        let mut request = self.client.post(self.synthesize_url()).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response).await;
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }

        let content_type = content_type_of(&response, "audio/wav");
        let duration_ms = response
            .headers()
            .get("X-TTS-Duration-Ms")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        let audio_data = response
            .bytes()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to read audio: {}", e)))?
            .to_vec();
        if audio_data.is_empty() {
            return Err(ProviderError::InvalidResponse("empty audio body".to_string()));
        }

        Ok(SynthesisOutput {
            audio_data,
            content_type,
            duration_ms,
        })
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.health_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
