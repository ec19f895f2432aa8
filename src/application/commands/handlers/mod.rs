//! Command Handlers 实现
//!
//! 所有 CommandHandler 的具体实现

mod job_command_handlers;

pub use job_command_handlers::*;
