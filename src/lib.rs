//! TTS Pipeline - 多 provider 文本转语音任务管线
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Job Context: 合成任务生命周期、请求指纹、文本归一化
//! - Provider Context: provider 描述与熔断状态机
//!
//! 应用层 (application/):
//! - Ports: TtsProvider, JobQueue, IdempotencyStore, JobRepository, ObjectStore, JobEvents
//! - Services: ProviderRegistry, JobExecutor, HealthAggregator
//! - Commands / Queries: CQRS 处理器
//!
//! 基础设施层 (infrastructure/):
//! - HTTP: RESTful API + WebSocket
//! - Worker: SynthesisWorker 队列消费、幂等表清理
//! - Persistence: SQLite job 记录 + Sled 队列与幂等表
//! - Adapters: provider HTTP 客户端、文件对象存储与签名 URL
//! - Events: job 状态推送

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{load_config, AppConfig};
