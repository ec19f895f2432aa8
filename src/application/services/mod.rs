//! Application Services - 跨用例共享的服务
//!
//! - ProviderRegistry: provider 注册与候选排序
//! - JobExecutor: 重试、降级、存储
//! - HealthAggregator: 健康与统计快照

mod health;
mod job_executor;
mod provider_registry;
mod provider_stats;

pub use health::{AdminStats, HealthAggregator, HealthSnapshot};
pub use job_executor::{ExecutorConfig, JobExecutor, JobFailure, JobOutcome};
pub use provider_registry::{ProviderRegistry, ProviderStatus, RegisteredProvider};
pub use provider_stats::{ProviderStats, ProviderStatsEntry};
