//! Job Executor - 单个 job 的执行流程
//!
//! worker 和 inline 路径共用：provider 重试与降级、熔断、音频存储、状态落库

use dashmap::DashMap;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::{ProviderRegistry, ProviderStats, RegisteredProvider};
use crate::application::error::ApplicationError;
use crate::application::ports::{
    JobEventPublisherPort, JobRepositoryPort, ObjectStorePort, StoredObject, SynthesisOutput,
};
use crate::domain::job::{AttemptOutcome, Job, ProviderAttempt};
use crate::domain::provider::Admission;

/// 执行器配置
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// 单个 job 的总时长上限
    pub job_timeout: Duration,
    /// 同一 provider 重试的退避基数
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// 音频上传的最大尝试次数
    pub storage_max_attempts: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(120),
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(8),
            storage_max_attempts: 3,
        }
    }
}

/// job 失败原因
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JobFailure {
    #[error("no providers available")]
    NoProviders,

    /// 每个 provider 一行：`provider: reason`
    #[error("{}", format_failures(.0))]
    Exhausted(Vec<(String, String)>),

    #[error("storage: {0}")]
    Storage(String),

    #[error("timeout: job exceeded {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    /// 记录已被其他执行者置为终态
    #[error("superseded")]
    Superseded,

    #[error("repository: {0}")]
    Repository(String),
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(provider, reason)| format!("{}: {}", provider, reason))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 执行结果
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed(Job),
    Failed(Job),
    /// 开始执行前已是终态（重复投递）
    Skipped(Job),
}

impl JobOutcome {
    pub fn job(&self) -> &Job {
        match self {
            JobOutcome::Completed(job) | JobOutcome::Failed(job) | JobOutcome::Skipped(job) => job,
        }
    }

    pub fn into_job(self) -> Job {
        match self {
            JobOutcome::Completed(job) | JobOutcome::Failed(job) | JobOutcome::Skipped(job) => job,
        }
    }
}

/// 执行期间注册的取消令牌，离开作用域时移除
struct CancelRegistration<'a> {
    tokens: &'a DashMap<String, CancellationToken>,
    job_id: String,
}

impl Drop for CancelRegistration<'_> {
    fn drop(&mut self) {
        self.tokens.remove(&self.job_id);
    }
}

/// Job 执行器
pub struct JobExecutor {
    config: ExecutorConfig,
    job_repo: Arc<dyn JobRepositoryPort>,
    registry: Arc<ProviderRegistry>,
    object_store: Arc<dyn ObjectStorePort>,
    stats: Arc<ProviderStats>,
    events: Arc<dyn JobEventPublisherPort>,
    cancel_tokens: DashMap<String, CancellationToken>,
}

impl JobExecutor {
    pub fn new(
        config: ExecutorConfig,
        job_repo: Arc<dyn JobRepositoryPort>,
        registry: Arc<ProviderRegistry>,
        object_store: Arc<dyn ObjectStorePort>,
        stats: Arc<ProviderStats>,
        events: Arc<dyn JobEventPublisherPort>,
    ) -> Self {
        Self {
            config,
            job_repo,
            registry,
            object_store,
            stats,
            events,
            cancel_tokens: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// 请求取消正在处理的 job，返回是否有执行中的 job 收到通知
    ///
    /// 只作用于已注册的令牌；不在执行中的 job 不留下令牌，否则 is_running 会误报
    pub fn request_cancel(&self, job_id: &str) -> bool {
        match self.cancel_tokens.get(job_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(job_id = %job_id, "Cancellation requested");
                true
            }
            None => {
                tracing::debug!(job_id = %job_id, "Cancellation requested for job that is not running");
                false
            }
        }
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.cancel_tokens.contains_key(job_id)
    }

    /// 执行一个 job 直到终态
    ///
    /// 返回 Err 表示基础设施故障（数据库不可用等），job 保持 processing，由队列重投递
    pub async fn execute(&self, job_id: &str) -> Result<JobOutcome, ApplicationError> {
        let mut job = self
            .job_repo
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Job", job_id))?;

        if job.is_terminal() {
            tracing::debug!(job_id = %job_id, status = %job.status, "Job already terminal, skipping");
            return Ok(JobOutcome::Skipped(job));
        }

        let token = self
            .cancel_tokens
            .entry(job_id.to_string())
            .or_default()
            .clone();
        let _registration = CancelRegistration {
            tokens: &self.cancel_tokens,
            job_id: job_id.to_string(),
        };

        if token.is_cancelled() {
            return self.finish_failed(job, JobFailure::Cancelled).await;
        }

        job.mark_processing()?;
        if !self.job_repo.update(&job).await? {
            return self.reload_skipped(job_id).await;
        }
        self.events.publish(&job);

        tracing::info!(
            job_id = %job_id,
            chars = job.request.char_count(),
            previous_attempts = job.attempts.len(),
            "Job processing"
        );

        let started = Instant::now();
        let result = tokio::time::timeout(self.config.job_timeout, self.run(&mut job, &token)).await;

        match result {
            Ok(Ok(())) => {
                tracing::info!(
                    job_id = %job_id,
                    provider = job.provider.as_deref().unwrap_or_default(),
                    attempts = job.attempts.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job completed"
                );
                Ok(JobOutcome::Completed(job))
            }
            Ok(Err(JobFailure::Superseded)) => self.reload_skipped(job_id).await,
            Ok(Err(JobFailure::Repository(message))) => {
                Err(ApplicationError::RepositoryError(message))
            }
            Ok(Err(failure)) => self.finish_failed(job, failure).await,
            Err(_) => {
                tracing::warn!(
                    job_id = %job_id,
                    timeout_secs = self.config.job_timeout.as_secs(),
                    "Job timed out"
                );
                self.finish_failed(job, JobFailure::Timeout(self.config.job_timeout))
                    .await
            }
        }
    }

    async fn run(&self, job: &mut Job, token: &CancellationToken) -> Result<(), JobFailure> {
        let candidates = self
            .registry
            .candidates(&job.request.provider_preference, job.request.char_count());
        if candidates.is_empty() {
            return Err(JobFailure::NoProviders);
        }

        let mut failures = Vec::with_capacity(candidates.len());
        for provider in &candidates {
            let name = provider.name();

            // 重投递时从已有的调用日志继续
            let exhausted = job.has_permanent_failure(name)
                || job.attempts_for(name) >= provider.descriptor.max_attempts;
            if !exhausted {
                if let Some(output) = self.try_provider(job, provider, token).await? {
                    return self.store_and_complete(job, name, output, token).await;
                }
            }

            let reason = job
                .last_failure_for(name)
                .map(describe_failure)
                .unwrap_or_else(|| "attempt budget exhausted".to_string());
            failures.push((name.to_string(), reason));
        }

        Err(JobFailure::Exhausted(failures))
    }

    /// 在一个 provider 上重试直到成功、预算耗尽或遇到 permanent 错误
    async fn try_provider(
        &self,
        job: &mut Job,
        provider: &RegisteredProvider,
        token: &CancellationToken,
    ) -> Result<Option<SynthesisOutput>, JobFailure> {
        let name = provider.name();
        let breakers = self.registry.breakers();
        let max_attempts = provider.descriptor.max_attempts;

        loop {
            let attempt = job.attempts_for(name) + 1;
            if attempt > max_attempts {
                return Ok(None);
            }

            let admission = breakers.try_acquire(name);
            if admission == Admission::Rejected {
                tracing::debug!(job_id = %job.id, provider = %name, "Circuit open, skipping provider");
                self.log_attempt(job, name, attempt, AttemptOutcome::Rejected, 0, Some("circuit open".to_string()))
                    .await?;
                return Ok(None);
            }

            // job 超时或取消时调用被直接丢弃，守卫负责归还试探名额
            let guard = breakers.guard(name, admission);

            let started = Instant::now();
            let result = tokio::select! {
                result = tokio::time::timeout(
                    provider.descriptor.call_timeout,
                    provider.client.synthesize(&job.request.text, &job.request.voice_options),
                ) => result,
                _ = token.cancelled() => return Err(JobFailure::Cancelled),
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(Ok(output)) => {
                    guard.record_success();
                    tracing::info!(
                        job_id = %job.id,
                        provider = %name,
                        attempt,
                        latency_ms,
                        bytes = output.audio_data.len(),
                        "Provider call succeeded"
                    );
                    self.log_attempt(job, name, attempt, AttemptOutcome::Success, latency_ms, None)
                        .await?;
                    return Ok(Some(output));
                }
                Ok(Err(e)) if !e.is_transient() => {
                    // permanent 错误不计入熔断，drop 守卫归还试探名额
                    drop(guard);
                    tracing::warn!(
                        job_id = %job.id,
                        provider = %name,
                        attempt,
                        error = %e,
                        "Provider call failed permanently"
                    );
                    self.log_attempt(job, name, attempt, AttemptOutcome::Permanent, latency_ms, Some(e.to_string()))
                        .await?;
                    return Ok(None);
                }
                Ok(Err(e)) => {
                    guard.record_failure();
                    tracing::warn!(
                        job_id = %job.id,
                        provider = %name,
                        attempt,
                        error = %e,
                        "Provider call failed"
                    );
                    self.log_attempt(job, name, attempt, AttemptOutcome::Transient, latency_ms, Some(e.to_string()))
                        .await?;
                }
                Err(_) => {
                    guard.record_failure();
                    tracing::warn!(
                        job_id = %job.id,
                        provider = %name,
                        attempt,
                        timeout_ms = provider.descriptor.call_timeout.as_millis() as u64,
                        "Provider call timed out"
                    );
                    self.log_attempt(job, name, attempt, AttemptOutcome::Timeout, latency_ms, Some("call timed out".to_string()))
                        .await?;
                }
            }

            if token.is_cancelled() {
                return Err(JobFailure::Cancelled);
            }
            if attempt >= max_attempts {
                return Ok(None);
            }

            let delay = self.backoff_delay(attempt);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = token.cancelled() => return Err(JobFailure::Cancelled),
            }
        }
    }

    async fn store_and_complete(
        &self,
        job: &mut Job,
        provider: &str,
        output: SynthesisOutput,
        token: &CancellationToken,
    ) -> Result<(), JobFailure> {
        if token.is_cancelled() {
            return Err(JobFailure::Cancelled);
        }

        let stored = self.store_with_retry(&job.id, &output).await?;

        if token.is_cancelled() {
            tracing::info!(job_id = %job.id, key = %stored.key, "Job cancelled after upload, discarding result");
            return Err(JobFailure::Cancelled);
        }

        job.complete(provider, stored.key, stored.url, output.duration_ms)
            .map_err(|e| JobFailure::Repository(e.to_string()))?;
        self.persist(job).await?;
        self.events.publish(job);
        Ok(())
    }

    async fn store_with_retry(
        &self,
        job_id: &str,
        output: &SynthesisOutput,
    ) -> Result<StoredObject, JobFailure> {
        let max_attempts = self.config.storage_max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self
                .object_store
                .store(&output.audio_data, &output.content_type)
                .await
            {
                Ok(stored) => return Ok(stored),
                Err(e) => {
                    tracing::warn!(job_id = %job_id, attempt, error = %e, "Audio upload failed");
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        tokio::time::sleep(self.backoff_delay(attempt)).await;
                    }
                }
            }
        }

        Err(JobFailure::Storage(last_error))
    }

    async fn log_attempt(
        &self,
        job: &mut Job,
        provider: &str,
        attempt: u32,
        outcome: AttemptOutcome,
        latency_ms: u64,
        error: Option<String>,
    ) -> Result<(), JobFailure> {
        self.stats.record(provider, outcome);
        job.record_attempt(ProviderAttempt {
            provider: provider.to_string(),
            attempt,
            outcome,
            latency_ms,
            error,
            at: chrono::Utc::now(),
        });
        // 每次尝试在下一次开始前落库，重投递时才能接着算预算
        self.persist(job).await
    }

    async fn persist(&self, job: &Job) -> Result<(), JobFailure> {
        match self.job_repo.update(job).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(JobFailure::Superseded),
            Err(e) => Err(JobFailure::Repository(e.to_string())),
        }
    }

    async fn finish_failed(
        &self,
        mut job: Job,
        failure: JobFailure,
    ) -> Result<JobOutcome, ApplicationError> {
        let reason = failure.to_string();
        job.fail(reason.clone())?;
        if !self.job_repo.update(&job).await? {
            return self.reload_skipped(&job.id).await;
        }
        self.events.publish(&job);

        tracing::warn!(job_id = %job.id, attempts = job.attempts.len(), reason = %reason, "Job failed");
        Ok(JobOutcome::Failed(job))
    }

    async fn reload_skipped(&self, job_id: &str) -> Result<JobOutcome, ApplicationError> {
        let job = self
            .job_repo
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Job", job_id))?;
        tracing::debug!(job_id = %job_id, status = %job.status, "Job finalized elsewhere");
        Ok(JobOutcome::Skipped(job))
    }

    /// 全抖动指数退避：random(0, ceiling)
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let ceiling_ms =
            backoff_ceiling(self.config.backoff_base, self.config.backoff_max, attempt).as_millis()
                as u64;
        if ceiling_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=ceiling_ms))
    }
}

/// min(base * 2^(n-1), max)
fn backoff_ceiling(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exp).min(max)
}

fn describe_failure(attempt: &ProviderAttempt) -> String {
    attempt
        .error
        .clone()
        .unwrap_or_else(|| attempt.outcome.as_str().to_string())
}
