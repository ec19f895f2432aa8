//! Job Events Port - 任务状态推送

use crate::domain::job::Job;

/// Job 状态变更的发布端口
///
/// 发布是尽力而为的，没有订阅者时直接丢弃
pub trait JobEventPublisherPort: Send + Sync {
    fn publish(&self, job: &Job);
}

/// 不推送任何事件
pub struct NoopJobEvents;

impl JobEventPublisherPort for NoopJobEvents {
    fn publish(&self, _job: &Job) {}
}
