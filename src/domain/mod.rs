//! Domain Layer - 领域层
//!
//! 包含两个限界上下文:
//! - Job Context: 合成任务与请求指纹
//! - Provider Context: 合成后端描述与熔断

pub mod job;
pub mod provider;

mod text_normalizer;

pub use text_normalizer::{normalize_text, NormalizeConfig, OverflowPolicy, DEFAULT_MAX_TEXT_LENGTH};
