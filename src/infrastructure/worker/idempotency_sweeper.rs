//! 过期幂等条目清理
//!
//! 过期条目按 job 状态处理：终态或记录缺失则删除，仍在进行中则续期，
//! 保证一个指纹不会同时对应两个未结束的 job

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{IdempotencyError, IdempotencyStorePort, JobRepositoryPort};
use crate::application::ApplicationError;

/// 单轮最多处理的条目数
const SWEEP_BATCH: usize = 512;

/// 单轮清理结果
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub released: usize,
    pub renewed: usize,
}

/// 处理一批过期条目
pub async fn sweep_expired(
    store: &dyn IdempotencyStorePort,
    job_repo: &dyn JobRepositoryPort,
) -> Result<SweepReport, ApplicationError> {
    let mut report = SweepReport::default();

    for (fingerprint, job_id) in store.expired_entries(SWEEP_BATCH).await? {
        let active = job_repo
            .find_by_id(&job_id)
            .await?
            .is_some_and(|job| !job.is_terminal());

        if active {
            match store.replace(&fingerprint, &job_id, &job_id).await {
                Ok(()) => report.renewed += 1,
                // 期间已被接管
                Err(IdempotencyError::AlreadyExists(_)) => {}
                Err(e) => return Err(e.into()),
            }
        } else if store.release(&fingerprint, &job_id).await? {
            report.released += 1;
        }
    }

    Ok(report)
}

/// 周期性清理，shutdown 后退出
pub async fn run_idempotency_sweeper(
    store: Arc<dyn IdempotencyStorePort>,
    job_repo: Arc<dyn JobRepositoryPort>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    if interval.is_zero() {
        tracing::info!("Idempotency sweeper disabled");
        return;
    }
    tracing::info!(interval_secs = interval.as_secs(), "Idempotency sweeper started");

    let mut ticker = tokio::time::interval(interval);
    // 第一次 tick 立即返回
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                match sweep_expired(store.as_ref(), job_repo.as_ref()).await {
                    Ok(SweepReport { released: 0, renewed: 0 }) => {}
                    Ok(report) => tracing::info!(
                        released = report.released,
                        renewed = report.renewed,
                        "Swept expired idempotency entries"
                    ),
                    Err(e) => tracing::warn!(error = %e, "Idempotency sweep failed"),
                }
            }
        }
    }

    tracing::info!("Idempotency sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::{Job, SynthesisRequest};
    use crate::infrastructure::persistence::sqlite::{
        create_pool, run_migrations, DatabaseConfig, SqliteJobRepository,
    };
    use crate::infrastructure::persistence::SledIdempotencyStore;

    async fn job_repo() -> Arc<dyn JobRepositoryPort> {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        Arc::new(SqliteJobRepository::new(pool))
    }

    fn store(ttl: Duration) -> Arc<SledIdempotencyStore> {
        let db = sled::Config::new().temporary(true).open().unwrap();
        Arc::new(SledIdempotencyStore::from_db(&db, ttl).unwrap())
    }

    #[tokio::test]
    async fn test_sweep_releases_finished_and_renews_active() {
        let repo = job_repo().await;
        let store = store(Duration::from_millis(30));

        let mut queued = Job::new(SynthesisRequest::new("still waiting"));
        queued.mark_queued().unwrap();
        repo.insert(&queued).await.unwrap();

        let mut failed = Job::new(SynthesisRequest::new("gave up"));
        failed.fail("cancelled").unwrap();
        repo.insert(&failed).await.unwrap();

        store.reserve(&queued.fingerprint, &queued.id).await.unwrap();
        store.reserve(&failed.fingerprint, &failed.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let report = sweep_expired(store.as_ref(), repo.as_ref()).await.unwrap();
        assert_eq!(report, SweepReport { released: 1, renewed: 1 });

        assert_eq!(
            store.lookup(&queued.fingerprint).await.unwrap().as_deref(),
            Some(queued.id.as_str())
        );
        assert!(store.lookup(&failed.fingerprint).await.unwrap().is_none());
        store.reserve(&failed.fingerprint, "job-new").await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_releases_entry_without_job() {
        let repo = job_repo().await;
        let store = store(Duration::from_millis(10));
        let orphan = Job::new(SynthesisRequest::new("never persisted"));
        store.reserve(&orphan.fingerprint, &orphan.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let report = sweep_expired(store.as_ref(), repo.as_ref()).await.unwrap();
        assert_eq!(report.released, 1);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_idempotency_sweeper(
            store(Duration::from_secs(60)),
            job_repo().await,
            Duration::from_millis(20),
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_zero_interval_disables_sweeper() {
        tokio::time::timeout(
            Duration::from_secs(1),
            run_idempotency_sweeper(
                store(Duration::from_secs(60)),
                job_repo().await,
                Duration::ZERO,
                CancellationToken::new(),
            ),
        )
        .await
        .unwrap();
    }
}
