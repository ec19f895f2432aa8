//! Worker Layer - 后台任务
//!
//! SynthesisWorker 消费队列，idempotency sweeper 清理过期指纹

mod idempotency_sweeper;
mod synthesis_worker;

pub use idempotency_sweeper::{run_idempotency_sweeper, sweep_expired, SweepReport};
pub use synthesis_worker::{SynthesisWorker, SynthesisWorkerConfig};
