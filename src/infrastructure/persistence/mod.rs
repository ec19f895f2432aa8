//! Persistence Layer - 数据持久化
//!
//! SQLite 保存 job 记录，Sled 保存队列与幂等条目

pub mod sled;
pub mod sqlite;

pub use self::sled::{SledIdempotencyStore, SledJobQueue, SledQueueConfig};
pub use self::sqlite::{create_pool, run_migrations, DbPool, SqliteJobRepository};
