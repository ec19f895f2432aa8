//! Provider Context - 合成后端上下文
//!
//! 包含:
//! - ProviderKind / ProviderDescriptor: 后端类型与能力描述
//! - CircuitBreaker: 单个 provider 的熔断状态机
//! - CircuitBreakerStore: 按 provider 名索引的熔断器集合

mod circuit_breaker;
mod descriptor;

pub use circuit_breaker::{
    Admission, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStore, CircuitSnapshot,
    CircuitState, TrialGuard,
};
pub use descriptor::{ProviderDescriptor, ProviderKind};
