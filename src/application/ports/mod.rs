//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod idempotency_store;
mod job_events;
mod job_queue;
mod job_repository;
mod object_store;
mod tts_provider;

pub use idempotency_store::{IdempotencyError, IdempotencyStorePort};
pub use job_events::{JobEventPublisherPort, NoopJobEvents};
pub use job_queue::{JobLease, JobQueuePort, QueueError, QueueSnapshot};
pub use job_repository::{JobRepositoryPort, RepositoryError};
pub use object_store::{ObjectStorePort, StorageError, StoredAudio, StoredObject};
pub use tts_provider::{ProviderError, SynthesisOutput, TtsProviderPort, VoiceInfo};
