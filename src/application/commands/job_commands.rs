//! Job Commands - 合成任务相关命令

use crate::domain::job::{JobStatus, Priority, VoiceOptions};

/// 提交合成请求
#[derive(Debug, Clone)]
pub struct GenerateSpeechCommand {
    /// 原始文本，处理前会先归一化
    pub text: String,
    /// 调用方指定的 provider，按顺序优先
    pub providers: Vec<String>,
    pub voice_options: VoiceOptions,
    pub priority: Priority,
}

impl GenerateSpeechCommand {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            providers: Vec::new(),
            voice_options: VoiceOptions::default(),
            priority: Priority::Normal,
        }
    }
}

/// 提交结果
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateSpeechResponse {
    pub job_id: String,
    pub status: JobStatus,
    /// 仅 completed 时存在
    pub result_url: Option<String>,
    pub provider: Option<String>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
    /// 命中已有 job
    pub deduplicated: bool,
}

/// 取消 job
#[derive(Debug, Clone)]
pub struct CancelJobCommand {
    pub job_id: String,
}

/// 取消结果
#[derive(Debug, Clone, PartialEq)]
pub struct CancelJobResponse {
    pub job_id: String,
    pub status: JobStatus,
    /// processing 中的 job 只能尽力取消，结果以后续状态为准
    pub cancel_requested: bool,
}
