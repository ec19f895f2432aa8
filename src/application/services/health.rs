//! Health Aggregator - 健康与统计快照
//!
//! 只读，不等待 worker

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ProviderRegistry, ProviderStats, ProviderStatsEntry, ProviderStatus};
use crate::application::error::ApplicationError;
use crate::application::ports::{JobQueuePort, JobRepositoryPort, QueueSnapshot};

/// 健康快照
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub available_providers: Vec<String>,
    pub providers: Vec<ProviderStatus>,
    /// 队列不可用时为空
    pub queue: Option<QueueSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_error: Option<String>,
}

/// 管理统计
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    /// status -> 数量
    pub jobs: BTreeMap<String, u64>,
    pub provider_calls: Vec<ProviderStatsEntry>,
    pub health: HealthSnapshot,
}

pub struct HealthAggregator {
    registry: Arc<ProviderRegistry>,
    queue: Arc<dyn JobQueuePort>,
    job_repo: Arc<dyn JobRepositoryPort>,
    stats: Arc<ProviderStats>,
}

impl HealthAggregator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        queue: Arc<dyn JobQueuePort>,
        job_repo: Arc<dyn JobRepositoryPort>,
        stats: Arc<ProviderStats>,
    ) -> Self {
        Self {
            registry,
            queue,
            job_repo,
            stats,
        }
    }

    /// 没有可用 provider 或队列 ping 失败时 healthy = false
    pub async fn snapshot(&self) -> HealthSnapshot {
        let available_providers = self.registry.available_names();
        let providers = self.registry.statuses();

        let (queue, queue_error) = match self.queue.ping().await {
            Ok(()) => match self.queue.snapshot().await {
                Ok(snapshot) => (Some(snapshot), None),
                Err(e) => (None, Some(e.to_string())),
            },
            Err(e) => (None, Some(e.to_string())),
        };

        let healthy = !available_providers.is_empty() && queue.is_some();
        if !healthy {
            tracing::warn!(
                available = available_providers.len(),
                queue_error = queue_error.as_deref().unwrap_or_default(),
                "Health check failed"
            );
        }

        HealthSnapshot {
            healthy,
            available_providers,
            providers,
            queue,
            queue_error,
        }
    }

    pub async fn admin_stats(&self) -> Result<AdminStats, ApplicationError> {
        let jobs = self
            .job_repo
            .count_by_status()
            .await?
            .into_iter()
            .map(|(status, count)| (status.as_str().to_string(), count))
            .collect();

        Ok(AdminStats {
            jobs,
            provider_calls: self.stats.snapshot(),
            health: self.snapshot().await,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::provider::{ProviderDescriptor, ProviderKind};
    use crate::test_support::{test_harness, ScriptedProvider};

    #[tokio::test]
    async fn test_healthy_with_available_provider() {
        let harness = test_harness(vec![(
            ProviderDescriptor::new("a", ProviderKind::Http),
            Arc::new(ScriptedProvider::always_ok()),
        )])
        .await;

        let snapshot = harness.health.snapshot().await;
        assert!(snapshot.healthy);
        assert_eq!(snapshot.available_providers, vec!["a"]);
        assert_eq!(snapshot.queue, Some(QueueSnapshot::default()));
    }

    #[tokio::test]
    async fn test_unhealthy_when_all_circuits_open() {
        let harness = test_harness(vec![(
            ProviderDescriptor::new("a", ProviderKind::Http),
            Arc::new(ScriptedProvider::always_ok()),
        )])
        .await;
        for _ in 0..5 {
            harness.registry.breakers().record_failure("a");
        }

        let snapshot = harness.health.snapshot().await;
        assert!(!snapshot.healthy);
        assert!(snapshot.available_providers.is_empty());
        assert_eq!(snapshot.providers[0].circuit.state.as_str(), "open");
    }

    #[tokio::test]
    async fn test_admin_stats_counts_jobs() {
        let harness = test_harness(vec![(
            ProviderDescriptor::new("a", ProviderKind::Http),
            Arc::new(ScriptedProvider::always_ok()),
        )])
        .await;
        let job = crate::domain::job::Job::new(crate::domain::job::SynthesisRequest::new("hi"));
        harness.job_repo.insert(&job).await.unwrap();
        harness.executor.execute(&job.id).await.unwrap();

        let stats = harness.health.admin_stats().await.unwrap();
        assert_eq!(stats.jobs.get("completed"), Some(&1));
        assert_eq!(stats.provider_calls[0].success, 1);
    }
}
