//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（TtsProvider、JobQueue、IdempotencyStore、JobRepository、ObjectStore）
//! - services: ProviderRegistry、JobExecutor、HealthAggregator
//! - commands: CQRS 命令及处理器
//! - queries: CQRS 查询及处理器
//! - error: 应用层错误定义

pub mod commands;
pub mod error;
pub mod ports;
pub mod queries;
pub mod services;

// Re-exports
pub use commands::{
    handlers::{CancelJobHandler, GenerateSpeechHandler, SubmissionConfig},
    CancelJobCommand, CancelJobResponse, GenerateSpeechCommand, GenerateSpeechResponse,
};

pub use error::ApplicationError;

pub use ports::{
    IdempotencyError, IdempotencyStorePort, JobEventPublisherPort, JobLease, JobQueuePort,
    JobRepositoryPort, NoopJobEvents, ObjectStorePort, ProviderError, QueueError, QueueSnapshot,
    RepositoryError, StorageError, StoredAudio, StoredObject, SynthesisOutput, TtsProviderPort,
    VoiceInfo,
};

pub use queries::{
    handlers::{GetAudioHandler, GetJobHandler, ListVoicesHandler},
    GetAudioQuery, GetAudioResponse, GetJob, ListVoices,
};

pub use services::{
    AdminStats, ExecutorConfig, HealthAggregator, HealthSnapshot, JobExecutor, JobFailure,
    JobOutcome, ProviderRegistry, ProviderStats, ProviderStatsEntry, ProviderStatus,
    RegisteredProvider,
};
