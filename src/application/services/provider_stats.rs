//! Provider Stats - 调用计数

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::job::AttemptOutcome;

#[derive(Debug, Default)]
struct Counters {
    success: AtomicU64,
    transient: AtomicU64,
    timeout: AtomicU64,
    permanent: AtomicU64,
    rejected: AtomicU64,
}

/// 单个 provider 的计数快照
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatsEntry {
    pub provider: String,
    pub success: u64,
    pub transient: u64,
    pub timeout: u64,
    pub permanent: u64,
    pub rejected: u64,
    /// 成功调用 / 实际调用，没有调用时为空
    pub success_rate: Option<f64>,
}

/// 进程内的 provider 调用统计
#[derive(Debug, Default)]
pub struct ProviderStats {
    counters: DashMap<String, Counters>,
}

impl ProviderStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, provider: &str, outcome: AttemptOutcome) {
        let entry = self.counters.entry(provider.to_string()).or_default();
        let counter = match outcome {
            AttemptOutcome::Success => &entry.success,
            AttemptOutcome::Transient => &entry.transient,
            AttemptOutcome::Timeout => &entry.timeout,
            AttemptOutcome::Permanent => &entry.permanent,
            AttemptOutcome::Rejected => &entry.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// 某个 provider 的失败调用数（transient + timeout + permanent）
    pub fn failures(&self, provider: &str) -> u64 {
        self.counters
            .get(provider)
            .map(|c| {
                c.transient.load(Ordering::Relaxed)
                    + c.timeout.load(Ordering::Relaxed)
                    + c.permanent.load(Ordering::Relaxed)
            })
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> Vec<ProviderStatsEntry> {
        let mut entries: Vec<ProviderStatsEntry> = self
            .counters
            .iter()
            .map(|item| {
                let c = item.value();
                let success = c.success.load(Ordering::Relaxed);
                let transient = c.transient.load(Ordering::Relaxed);
                let timeout = c.timeout.load(Ordering::Relaxed);
                let permanent = c.permanent.load(Ordering::Relaxed);
                let calls = success + transient + timeout + permanent;
                ProviderStatsEntry {
                    provider: item.key().clone(),
                    success,
                    transient,
                    timeout,
                    permanent,
                    rejected: c.rejected.load(Ordering::Relaxed),
                    success_rate: (calls > 0).then(|| success as f64 / calls as f64),
                }
            })
            .collect();
        entries.sort_by(|a, b| a.provider.cmp(&b.provider));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_success_rate() {
        let stats = ProviderStats::new();
        stats.record("a", AttemptOutcome::Success);
        stats.record("a", AttemptOutcome::Transient);
        stats.record("a", AttemptOutcome::Timeout);
        stats.record("a", AttemptOutcome::Success);
        stats.record("a", AttemptOutcome::Rejected);

        assert_eq!(stats.failures("a"), 2);
        assert_eq!(stats.failures("b"), 0);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].rejected, 1);
        assert_eq!(snapshot[0].success_rate, Some(0.5));
    }
}
