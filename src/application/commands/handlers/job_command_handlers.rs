//! Job Command Handlers

use std::sync::Arc;

use crate::application::commands::job_commands::*;
use crate::application::error::ApplicationError;
use crate::application::ports::{
    IdempotencyError, IdempotencyStorePort, JobEventPublisherPort, JobQueuePort,
    JobRepositoryPort, ObjectStorePort,
};
use crate::application::services::JobExecutor;
use crate::domain::job::{Job, JobStatus, SynthesisRequest};
use crate::domain::{normalize_text, NormalizeConfig};

/// 提交流程配置
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmissionConfig {
    pub normalize: NormalizeConfig,
    /// 归一化后不超过该长度的文本在请求内同步执行，0 表示关闭
    pub inline_max_chars: usize,
}

impl GenerateSpeechResponse {
    fn from_job(job: &Job, object_store: &dyn ObjectStorePort, deduplicated: bool) -> Self {
        // 每次返回都重新签名，避免把已过期的 URL 交给调用方
        let result_url = match (job.status, job.audio_key.as_deref()) {
            (JobStatus::Completed, Some(key)) => Some(object_store.sign_url(key)),
            _ => None,
        };
        Self {
            job_id: job.id.clone(),
            status: job.status,
            result_url,
            provider: job.provider.clone(),
            duration_ms: job.duration_ms,
            error: job.error.clone(),
            deduplicated,
        }
    }
}

/// GenerateSpeech Handler - 受理合成请求
///
/// 归一化 -> 校验 -> 指纹去重 -> 入队（或 inline 执行）
pub struct GenerateSpeechHandler {
    config: SubmissionConfig,
    job_repo: Arc<dyn JobRepositoryPort>,
    idempotency: Arc<dyn IdempotencyStorePort>,
    queue: Arc<dyn JobQueuePort>,
    object_store: Arc<dyn ObjectStorePort>,
    executor: Arc<JobExecutor>,
    events: Arc<dyn JobEventPublisherPort>,
}

impl GenerateSpeechHandler {
    pub fn new(
        config: SubmissionConfig,
        job_repo: Arc<dyn JobRepositoryPort>,
        idempotency: Arc<dyn IdempotencyStorePort>,
        queue: Arc<dyn JobQueuePort>,
        object_store: Arc<dyn ObjectStorePort>,
        executor: Arc<JobExecutor>,
        events: Arc<dyn JobEventPublisherPort>,
    ) -> Self {
        Self {
            config,
            job_repo,
            idempotency,
            queue,
            object_store,
            executor,
            events,
        }
    }

    pub async fn handle(
        &self,
        cmd: GenerateSpeechCommand,
    ) -> Result<GenerateSpeechResponse, ApplicationError> {
        // 校验全部在入队之前完成
        let text = normalize_text(&cmd.text, &self.config.normalize)?;
        cmd.voice_options.validate()?;
        self.executor
            .registry()
            .validate_preference(&cmd.providers)?;

        // 队列不可用时直接失败，不创建 job
        self.queue.ping().await?;

        let request = SynthesisRequest::new(text)
            .with_providers(cmd.providers)
            .with_voice_options(cmd.voice_options)
            .with_priority(cmd.priority);
        let mut job = Job::new(request);

        match self.idempotency.reserve(&job.fingerprint, &job.id).await {
            Ok(()) => {}
            Err(IdempotencyError::AlreadyExists(existing_id)) => {
                if let Some(response) = self.resolve_existing(&job, &existing_id).await? {
                    return Ok(response);
                }
            }
            Err(IdempotencyError::Expired(existing_id)) => {
                if let Some(response) = self.resolve_expired(&job, &existing_id).await? {
                    return Ok(response);
                }
            }
            Err(e) => return Err(e.into()),
        }

        let inline = self.config.inline_max_chars > 0
            && job.request.char_count() <= self.config.inline_max_chars;

        if inline {
            self.insert_or_release(&job).await?;
            tracing::info!(job_id = %job.id, "Executing job inline");
            let outcome = self.executor.execute(&job.id).await?;
            return Ok(GenerateSpeechResponse::from_job(
                outcome.job(),
                self.object_store.as_ref(),
                false,
            ));
        }

        job.mark_queued()?;
        self.insert_or_release(&job).await?;

        if let Err(e) = self.queue.enqueue(&job.id, job.request.priority).await {
            tracing::error!(job_id = %job.id, error = %e, "Failed to enqueue job");
            job.fail(format!("queue unavailable: {}", e))?;
            self.job_repo.update(&job).await?;
            self.idempotency.release(&job.fingerprint, &job.id).await?;
            return Err(e.into());
        }
        self.events.publish(&job);

        tracing::info!(
            job_id = %job.id,
            fingerprint = %job.fingerprint,
            priority = job.request.priority.as_str(),
            chars = job.request.char_count(),
            "Job queued"
        );

        Ok(GenerateSpeechResponse::from_job(
            &job,
            self.object_store.as_ref(),
            false,
        ))
    }

    /// 指纹已被占用时的处理
    ///
    /// 返回 None 表示已把指纹转给新 job，调用方继续创建
    async fn resolve_existing(
        &self,
        job: &Job,
        existing_id: &str,
    ) -> Result<Option<GenerateSpeechResponse>, ApplicationError> {
        let existing = self.job_repo.find_by_id(existing_id).await?;

        match existing {
            Some(existing) if existing.status == JobStatus::Failed => {
                match self
                    .idempotency
                    .replace(&job.fingerprint, existing_id, &job.id)
                    .await
                {
                    Ok(()) => {
                        tracing::info!(
                            job_id = %job.id,
                            previous_job_id = %existing_id,
                            "Resubmitting previously failed request"
                        );
                        Ok(None)
                    }
                    // 其他调用方抢先重新提交了
                    Err(IdempotencyError::AlreadyExists(winner)) => {
                        Ok(Some(self.existing_response(&winner).await?))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Some(existing) => {
                tracing::debug!(
                    job_id = %existing.id,
                    status = %existing.status,
                    "Duplicate request, returning existing job"
                );
                Ok(Some(GenerateSpeechResponse::from_job(
                    &existing,
                    self.object_store.as_ref(),
                    true,
                )))
            }
            // 占用者还没写入记录
            None => Ok(Some(pending_response(existing_id))),
        }
    }

    /// 指纹条目已过期时的处理
    ///
    /// 原 job 仍未结束则续期并返回它；已结束或没有记录才把指纹转给新 job
    async fn resolve_expired(
        &self,
        job: &Job,
        existing_id: &str,
    ) -> Result<Option<GenerateSpeechResponse>, ApplicationError> {
        let active = self
            .job_repo
            .find_by_id(existing_id)
            .await?
            .filter(|existing| !existing.is_terminal());
        let successor = match &active {
            Some(_) => existing_id,
            None => job.id.as_str(),
        };

        match self
            .idempotency
            .replace(&job.fingerprint, existing_id, successor)
            .await
        {
            Ok(()) => {}
            Err(IdempotencyError::AlreadyExists(winner)) => {
                return Ok(Some(self.existing_response(&winner).await?));
            }
            Err(e) => return Err(e.into()),
        }

        match active {
            Some(active) => {
                tracing::info!(
                    job_id = %active.id,
                    status = %active.status,
                    "Renewed expired reservation of active job"
                );
                Ok(Some(GenerateSpeechResponse::from_job(
                    &active,
                    self.object_store.as_ref(),
                    true,
                )))
            }
            None => {
                tracing::info!(
                    job_id = %job.id,
                    previous_job_id = %existing_id,
                    "Took over expired reservation"
                );
                Ok(None)
            }
        }
    }

    async fn existing_response(
        &self,
        job_id: &str,
    ) -> Result<GenerateSpeechResponse, ApplicationError> {
        Ok(match self.job_repo.find_by_id(job_id).await? {
            Some(job) => GenerateSpeechResponse::from_job(&job, self.object_store.as_ref(), true),
            None => pending_response(job_id),
        })
    }

    async fn insert_or_release(&self, job: &Job) -> Result<(), ApplicationError> {
        if let Err(e) = self.job_repo.insert(job).await {
            tracing::error!(job_id = %job.id, error = %e, "Failed to persist job");
            if let Err(release_err) = self.idempotency.release(&job.fingerprint, &job.id).await {
                tracing::warn!(job_id = %job.id, error = %release_err, "Failed to release fingerprint");
            }
            return Err(e.into());
        }
        Ok(())
    }
}

fn pending_response(job_id: &str) -> GenerateSpeechResponse {
    GenerateSpeechResponse {
        job_id: job_id.to_string(),
        status: JobStatus::Pending,
        result_url: None,
        provider: None,
        duration_ms: None,
        error: None,
        deduplicated: true,
    }
}

/// CancelJob Handler - 取消 job
///
/// 队列中的 job 直接移除并置为 failed，处理中的 job 通知执行器尽力取消
pub struct CancelJobHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
    queue: Arc<dyn JobQueuePort>,
    executor: Arc<JobExecutor>,
    events: Arc<dyn JobEventPublisherPort>,
}

impl CancelJobHandler {
    pub fn new(
        job_repo: Arc<dyn JobRepositoryPort>,
        queue: Arc<dyn JobQueuePort>,
        executor: Arc<JobExecutor>,
        events: Arc<dyn JobEventPublisherPort>,
    ) -> Self {
        Self {
            job_repo,
            queue,
            executor,
            events,
        }
    }

    pub async fn handle(&self, cmd: CancelJobCommand) -> Result<CancelJobResponse, ApplicationError> {
        let mut job = self
            .job_repo
            .find_by_id(&cmd.job_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Job", &cmd.job_id))?;

        if job.is_terminal() {
            return Err(ApplicationError::invalid_state(format!(
                "job {} is already {}",
                job.id, job.status
            )));
        }

        if self.queue.cancel(&job.id).await? {
            job.fail("cancelled")?;
            if self.job_repo.update(&job).await? {
                self.events.publish(&job);
                tracing::info!(job_id = %job.id, "Queued job cancelled");
                return Ok(CancelJobResponse {
                    job_id: job.id,
                    status: JobStatus::Failed,
                    cancel_requested: true,
                });
            }
        }

        let cancel_requested = self.executor.request_cancel(&job.id);
        Ok(CancelJobResponse {
            job_id: job.id,
            status: job.status,
            cancel_requested,
        })
    }
}
