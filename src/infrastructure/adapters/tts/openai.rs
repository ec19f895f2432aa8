//! OpenAI Speech Provider

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{content_type_of, map_send_error, read_error_body};
use crate::application::ports::{ProviderError, SynthesisOutput, TtsProviderPort, VoiceInfo};
use crate::domain::job::VoiceOptions;

pub const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI 内置音色
const VOICES: &[&str] = &["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub name: String,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub default_voice: String,
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            base_url: DEFAULT_OPENAI_API_URL.to_string(),
            model: "tts-1".to_string(),
            default_voice: "alloy".to_string(),
            timeout_secs: 30,
        }
    }
}

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl TtsProviderPort for OpenAiProvider {
    async fn synthesize(
        &self,
        text: &str,
        options: &VoiceOptions,
    ) -> Result<SynthesisOutput, ProviderError> {
        let voice = options.voice_id().unwrap_or(&self.config.default_voice);
        if !VOICES.contains(&voice) {
            return Err(ProviderError::VoiceNotFound(voice.to_string()));
        }

        let body = SpeechRequest {
            model: &self.config.model,
            input: text,
            voice,
            response_format: "mp3",
            speed: options.speed(),
        };

        tracing::debug!(provider = %self.config.name, model = %self.config.model, voice = %voice, text_len = text.len(), "OpenAI TTS request");

        let response = self
            .client
            .post(format!("{}/audio/speech", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response).await;
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }

        let content_type = content_type_of(&response, "audio/mpeg");
        let audio_data = response
            .bytes()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?
            .to_vec();

        Ok(SynthesisOutput {
            audio_data,
            content_type,
            duration_ms: None,
        })
    }

    async fn voices(&self) -> Result<Vec<VoiceInfo>, ProviderError> {
        Ok(VOICES
            .iter()
            .map(|v| VoiceInfo {
                id: v.to_string(),
                name: v.to_string(),
                language: None,
                provider: self.config.name.clone(),
            })
            .collect())
    }
}
