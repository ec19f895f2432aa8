//! Synthesis Worker - 队列消费者
//!
//! 一个分发循环 + semaphore 限流，每个租约一个 tokio task

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{JobLease, JobQueuePort};
use crate::application::{ApplicationError, JobExecutor, JobOutcome};

/// 队列出错后的等待时间
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Worker 配置
#[derive(Debug, Clone)]
pub struct SynthesisWorkerConfig {
    /// 最大并发任务数
    pub concurrency: usize,
}

impl Default for SynthesisWorkerConfig {
    fn default() -> Self {
        Self { concurrency: 5 }
    }
}

/// 合成 Worker
pub struct SynthesisWorker {
    config: SynthesisWorkerConfig,
    queue: Arc<dyn JobQueuePort>,
    executor: Arc<JobExecutor>,
    shutdown: CancellationToken,
}

impl SynthesisWorker {
    pub fn new(
        config: SynthesisWorkerConfig,
        queue: Arc<dyn JobQueuePort>,
        executor: Arc<JobExecutor>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            queue,
            executor,
            shutdown,
        }
    }

    /// 启动 Worker，shutdown 触发后停止出队并等待在途任务结束
    pub async fn run(self) {
        tracing::info!(concurrency = self.config.concurrency, "SynthesisWorker started");

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        loop {
            // 先拿 permit 再出队，避免租到跑不了的任务
            let permit = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    log_task_result(result);
                    continue;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let lease = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                lease = self.queue.dequeue() => lease,
            };

            let lease = match lease {
                Ok(lease) => lease,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to dequeue job");
                    drop(permit);
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(QUEUE_ERROR_BACKOFF) => continue,
                    }
                }
            };

            let queue = self.queue.clone();
            let executor = self.executor.clone();
            tasks.spawn(async move {
                let _permit = permit; // 持有 permit 直到任务完成
                Self::process_lease(lease, queue, executor).await;
            });
        }

        tracing::info!(in_flight = tasks.len(), "SynthesisWorker draining");
        while let Some(result) = tasks.join_next().await {
            log_task_result(result);
        }
        tracing::info!("SynthesisWorker stopped");
    }

    /// 处理单个租约
    async fn process_lease(lease: JobLease, queue: Arc<dyn JobQueuePort>, executor: Arc<JobExecutor>) {
        tracing::debug!(
            job_id = %lease.job_id,
            deliveries = lease.deliveries,
            "Processing job"
        );

        let settled = match executor.execute(&lease.job_id).await {
            Ok(JobOutcome::Completed(_)) | Ok(JobOutcome::Skipped(_)) => queue.ack(&lease).await,
            Ok(JobOutcome::Failed(_)) => queue.fail(&lease).await,
            Err(ApplicationError::NotFound { .. }) => {
                tracing::warn!(job_id = %lease.job_id, "Queued job has no record, dropping");
                queue.ack(&lease).await
            }
            Err(e) => {
                // 不 ack，lease 过期后重新投递
                tracing::error!(
                    job_id = %lease.job_id,
                    error = %e,
                    "Job execution error, leaving lease to expire"
                );
                return;
            }
        };

        if let Err(e) = settled {
            tracing::warn!(job_id = %lease.job_id, error = %e, "Failed to settle lease");
        }
    }
}

fn log_task_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!(error = %e, "Job task panicked, lease will expire for redelivery");
        }
    }
}
