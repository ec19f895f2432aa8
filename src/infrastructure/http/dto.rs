//! Data Transfer Objects
//!
//! 请求/响应字段统一使用 camelCase

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::{CancelJobResponse, GenerateSpeechCommand, GenerateSpeechResponse, VoiceInfo};
use crate::domain::job::{Job, JobStatus, Priority, ProviderAttempt, VoiceOptions, VOICE_ID};

// ============================================================================
// Generate
// ============================================================================

/// provider 可以是单个名字或有序列表
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProviderSelection {
    One(String),
    Many(Vec<String>),
}

impl ProviderSelection {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            ProviderSelection::One(name) => vec![name],
            ProviderSelection::Many(names) => names,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub text: String,
    #[serde(default)]
    pub provider: Option<ProviderSelection>,
    /// voiceOptions.voice_id 的简写
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub voice_options: Option<VoiceOptions>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl GenerateRequest {
    pub fn into_command(self) -> GenerateSpeechCommand {
        let mut voice_options = self.voice_options.unwrap_or_default();
        if let Some(voice) = self.voice {
            voice_options.insert(VOICE_ID, voice);
        }

        GenerateSpeechCommand {
            text: self.text,
            providers: self.provider.map(ProviderSelection::into_vec).unwrap_or_default(),
            voice_options,
            priority: self.priority.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// 音频时长（毫秒）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deduplicated: bool,
}

impl From<GenerateSpeechResponse> for GenerateResponse {
    fn from(r: GenerateSpeechResponse) -> Self {
        Self {
            job_id: r.job_id,
            status: r.status,
            result_url: r.result_url,
            provider: r.provider,
            duration: r.duration_ms,
            error: r.error,
            deduplicated: r.deduplicated,
        }
    }
}

// ============================================================================
// Jobs
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResponse {
    pub provider: String,
    pub attempt: u32,
    pub outcome: &'static str,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

impl From<ProviderAttempt> for AttemptResponse {
    fn from(a: ProviderAttempt) -> Self {
        Self {
            provider: a.provider,
            attempt: a.attempt,
            outcome: a.outcome.as_str(),
            latency_ms: a.latency_ms,
            error: a.error,
            at: a.at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: Vec<AttemptResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            result_url: job.result_url,
            error: job.error,
            attempts: job.attempts.into_iter().map(AttemptResponse::from).collect(),
            provider: job.provider,
            duration: job.duration_ms,
            priority: job.request.priority,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub cancel_requested: bool,
}

impl From<CancelJobResponse> for CancelResponse {
    fn from(r: CancelJobResponse) -> Self {
        Self {
            job_id: r.job_id,
            status: r.status,
            cancel_requested: r.cancel_requested,
        }
    }
}

// ============================================================================
// Voices / Audio
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct VoicesQuery {
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VoicesResponse {
    pub voices: Vec<VoiceInfo>,
}

#[derive(Debug, Deserialize)]
pub struct AudioQuery {
    pub expires: i64,
    pub signature: String,
}
