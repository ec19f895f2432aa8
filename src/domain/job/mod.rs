//! Job Context - 合成任务上下文
//!
//! 包含:
//! - Aggregate: Job（生命周期与 provider 调用日志）
//! - Value Objects: SynthesisRequest, VoiceOptions, Priority, RequestFingerprint
//! - Errors: ValidationError, JobStateError

mod aggregate;
mod errors;
mod value_objects;

pub use aggregate::{AttemptOutcome, Job, JobStatus, ProviderAttempt};
pub use errors::{JobStateError, ValidationError};
pub use value_objects::{
    Priority, RequestFingerprint, SynthesisRequest, VoiceOptions, LANGUAGE, PITCH, SPEED,
    STABILITY, VOICE_ID,
};
