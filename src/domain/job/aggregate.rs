//! Job Context - Aggregate Root

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{JobStateError, RequestFingerprint, SynthesisRequest};

/// Job 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 已创建，尚未入队
    Pending,
    /// 已入队，等待 worker
    Queued,
    /// worker 正在处理
    Processing,
    /// 合成并存储完成
    Completed,
    /// 终态失败（含取消、超时）
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// 只允许前进
    ///
    /// - pending -> processing：inline 执行不经过队列
    /// - pending/queued -> failed：取消
    /// - processing -> processing：队列重投递
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Queued)
                | (Pending, Processing)
                | (Queued, Processing)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Pending, Failed)
                | (Queued, Failed)
                | (Processing, Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单次 provider 调用结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    /// 网络错误、限流、5xx
    Transient,
    /// 单次调用超时，按 transient 处理
    Timeout,
    /// 鉴权失败、不支持的音色等配置问题
    Permanent,
    /// 熔断器拒绝，未真正发起调用
    Rejected,
}

impl AttemptOutcome {
    /// 是否真正调用了 provider
    pub fn is_call(&self) -> bool {
        !matches!(self, AttemptOutcome::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Transient => "transient",
            AttemptOutcome::Timeout => "timeout",
            AttemptOutcome::Permanent => "permanent",
            AttemptOutcome::Rejected => "rejected",
        }
    }
}

/// provider 调用日志条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAttempt {
    pub provider: String,
    /// 该 provider 上的第几次调用（从 1 开始）
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// Job 聚合根
///
/// 不变量:
/// - status 只前进，completed / failed 为终态
/// - result_url 当且仅当 completed 时存在
/// - error 当且仅当 failed 时存在
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub fingerprint: RequestFingerprint,
    pub request: SynthesisRequest,
    pub status: JobStatus,
    pub attempts: Vec<ProviderAttempt>,
    pub result_url: Option<String>,
    /// 对象存储 key，仅内部使用，对外只暴露签名 URL
    pub audio_key: Option<String>,
    /// 实际产出音频的 provider
    pub provider: Option<String>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(request: SynthesisRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            fingerprint: request.fingerprint(),
            request,
            status: JobStatus::Pending,
            attempts: Vec::new(),
            result_url: None,
            audio_key: None,
            provider: None,
            duration_ms: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), JobStateError> {
        if !self.status.can_transition_to(next) {
            return Err(JobStateError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_queued(&mut self) -> Result<(), JobStateError> {
        self.transition(JobStatus::Queued)
    }

    pub fn mark_processing(&mut self) -> Result<(), JobStateError> {
        self.transition(JobStatus::Processing)
    }

    pub fn record_attempt(&mut self, attempt: ProviderAttempt) {
        self.attempts.push(attempt);
        self.updated_at = Utc::now();
    }

    pub fn complete(
        &mut self,
        provider: impl Into<String>,
        audio_key: impl Into<String>,
        result_url: impl Into<String>,
        duration_ms: Option<u64>,
    ) -> Result<(), JobStateError> {
        if !self
            .attempts
            .iter()
            .any(|a| a.outcome == AttemptOutcome::Success)
        {
            return Err(JobStateError::MissingSuccessfulAttempt);
        }
        self.transition(JobStatus::Completed)?;
        self.provider = Some(provider.into());
        self.audio_key = Some(audio_key.into());
        self.result_url = Some(result_url.into());
        self.duration_ms = duration_ms;
        self.error = None;
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), JobStateError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(reason.into());
        self.result_url = None;
        Ok(())
    }

    /// 某个 provider 上真正发起过的调用次数
    pub fn attempts_for(&self, provider: &str) -> u32 {
        self.attempts
            .iter()
            .filter(|a| a.provider == provider && a.outcome.is_call())
            .count() as u32
    }

    /// 某个 provider 最后一次失败
    pub fn last_failure_for(&self, provider: &str) -> Option<&ProviderAttempt> {
        self.attempts
            .iter()
            .rev()
            .find(|a| a.provider == provider && a.outcome != AttemptOutcome::Success)
    }

    pub fn has_permanent_failure(&self, provider: &str) -> bool {
        self.attempts
            .iter()
            .any(|a| a.provider == provider && a.outcome == AttemptOutcome::Permanent)
    }
}
