//! ElevenLabs Provider

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{content_type_of, map_send_error, read_error_body};
use crate::application::ports::{ProviderError, SynthesisOutput, TtsProviderPort, VoiceInfo};
use crate::domain::job::VoiceOptions;

pub const DEFAULT_ELEVENLABS_API_URL: &str = "https://api.elevenlabs.io/v1";
const DEFAULT_MODEL: &str = "eleven_multilingual_v2";

#[derive(Debug, Serialize)]
struct ElevenLabsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language_code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_settings: Option<VoiceSettings>,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    stability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct VoicesResponse {
    voices: Vec<ElevenLabsVoice>,
}

#[derive(Debug, Deserialize)]
struct ElevenLabsVoice {
    voice_id: String,
    name: String,
    #[serde(default)]
    labels: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub name: String,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub default_voice: String,
    pub timeout_secs: u64,
}

impl ElevenLabsConfig {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>, default_voice: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            base_url: DEFAULT_ELEVENLABS_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            default_voice: default_voice.into(),
            timeout_secs: 30,
        }
    }
}

pub struct ElevenLabsProvider {
    client: Client,
    config: ElevenLabsConfig,
}

impl ElevenLabsProvider {
    pub fn new(config: ElevenLabsConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn body<'a>(&'a self, text: &'a str, options: &'a VoiceOptions) -> ElevenLabsRequest<'a> {
        let settings = (options.stability().is_some() || options.speed().is_some()).then(|| {
            VoiceSettings {
                stability: options.stability(),
                speed: options.speed(),
            }
        });
        ElevenLabsRequest {
            text,
            model_id: &self.config.model,
            language_code: options.language(),
            voice_settings: settings,
        }
    }
}

#[async_trait]
impl TtsProviderPort for ElevenLabsProvider {
    async fn synthesize(
        &self,
        text: &str,
        options: &VoiceOptions,
    ) -> Result<SynthesisOutput, ProviderError> {
        let voice = options.voice_id().unwrap_or(&self.config.default_voice);
        let url = format!("{}/text-to-speech/{}", self.config.base_url, voice);

        tracing::debug!(provider = %self.config.name, voice = %voice, text_len = text.len(), "ElevenLabs TTS request");

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.config.api_key)
            .json(&self.body(text, options))
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
        let response = self
            .client
            .get(format!("{}/voices", self.config.base_url))
            .header("xi-api-key", &self.config.api_key)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response).await;
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }

        let parsed: VoicesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(parsed
            .voices
            .into_iter()
            .map(|v| VoiceInfo {
                id: v.voice_id,
                name: v.name,
                language: v.labels.get("language").cloned(),
                provider: self.config.name.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::{STABILITY, VOICE_ID};

    #[test]
    fn test_body_includes_voice_settings_only_when_set() {
        let provider =
            ElevenLabsProvider::new(ElevenLabsConfig::new("eleven", "key", "rachel")).unwrap();

        let plain = VoiceOptions::new();
        let json = serde_json::to_value(provider.body("hi", &plain)).unwrap();
        assert!(json.get("voice_settings").is_none());
        assert_eq!(json["model_id"], DEFAULT_MODEL);

        let tuned = VoiceOptions::new().with(STABILITY, 0.4).with(VOICE_ID, "adam");
        let json = serde_json::to_value(provider.body("hi", &tuned)).unwrap();
        assert_eq!(json["voice_settings"]["stability"], 0.4);
    }
}
