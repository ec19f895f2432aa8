//! Fake Provider - 本地开发与联调用
//!
//! 不调用任何外部服务，按文本长度生成一段静音 WAV

use async_trait::async_trait;
use std::time::Duration;

use crate::application::ports::{ProviderError, SynthesisOutput, TtsProviderPort, VoiceInfo};
use crate::domain::job::VoiceOptions;

/// 每个字符对应的时长（毫秒）
const MS_PER_CHAR: u64 = 60;

/// Fake provider 配置
#[derive(Debug, Clone)]
pub struct FakeProviderConfig {
    pub name: String,
    /// 模拟推理延迟
    pub latency: Duration,
    /// 采样率
    pub sample_rate: u32,
}

impl FakeProviderConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latency: Duration::ZERO,
            sample_rate: 16000,
        }
    }
}

pub struct FakeProvider {
    config: FakeProviderConfig,
}

impl FakeProvider {
    pub fn new(config: FakeProviderConfig) -> Self {
        tracing::info!(
            provider = %config.name,
            latency_ms = config.latency.as_millis() as u64,
            "FakeProvider initialized"
        );
        Self { config }
    }
}

/// 生成 16-bit 单声道静音 WAV
fn silent_wav(sample_rate: u32, duration_ms: u64) -> Vec<u8> {
    let bits_per_sample: u16 = 16;
    let num_channels: u16 = 1;
    let byte_rate = sample_rate * num_channels as u32 * (bits_per_sample / 8) as u32;
    let block_align = num_channels * (bits_per_sample / 8);

    let samples = (sample_rate as u64 * duration_ms / 1000) as usize;
    let data_size = samples * 2;
    let file_size = 36 + data_size;

    let mut wav = Vec::with_capacity(44 + data_size);

    // RIFF header
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(file_size as u32).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    // fmt chunk
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&num_channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data_size as u32).to_le_bytes());
    wav.resize(44 + data_size, 0);

    wav
}

#[async_trait]
impl TtsProviderPort for FakeProvider {
    async fn synthesize(
        &self,
        text: &str,
        _options: &VoiceOptions,
    ) -> Result<SynthesisOutput, ProviderError> {
        tracing::debug!(provider = %self.config.name, text_len = text.len(), "FakeProvider: generating silence");

        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }

        let duration_ms = text.chars().count() as u64 * MS_PER_CHAR;
        Ok(SynthesisOutput {
            audio_data: silent_wav(self.config.sample_rate, duration_ms),
            content_type: "audio/wav".to_string(),
            duration_ms: Some(duration_ms),
        })
    }

    async fn voices(&self) -> Result<Vec<VoiceInfo>, ProviderError> {
        Ok(vec![VoiceInfo {
            id: "silence".to_string(),
            name: "Silence".to_string(),
            language: None,
            provider: self.config.name.clone(),
        }])
    }
}
