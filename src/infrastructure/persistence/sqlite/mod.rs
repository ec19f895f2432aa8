//! SQLite Persistence - Job 记录持久化

mod database;
mod job_repo;

pub use database::*;
pub use job_repo::*;
