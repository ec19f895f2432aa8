//! Sled Persistence - 队列与幂等存储

mod idempotency_store;
mod job_queue;

pub use idempotency_store::SledIdempotencyStore;
pub use job_queue::{SledJobQueue, SledQueueConfig};
