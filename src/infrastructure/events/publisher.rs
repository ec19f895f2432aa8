//! Event Publisher Implementation
//!
//! 按 job 分发状态变更，供 WebSocket 订阅

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::application::ports::JobEventPublisherPort;
use crate::domain::job::Job;

/// 单个 job 通道的缓冲大小
const CHANNEL_CAPACITY: usize = 16;

/// WebSocket 事件类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum WsEvent {
    /// 任务状态变更
    #[serde(rename_all = "camelCase")]
    JobStatusChanged {
        job_id: String,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        result_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl WsEvent {
    pub fn from_job(job: &Job) -> Self {
        WsEvent::JobStatusChanged {
            job_id: job.id.clone(),
            status: job.status.as_str().to_string(),
            result_url: job.result_url.clone(),
            provider: job.provider.clone(),
            duration_ms: job.duration_ms,
            error: job.error.clone(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            WsEvent::JobStatusChanged { status, .. } => status == "completed" || status == "failed",
        }
    }
}

/// 事件发布器
pub struct EventPublisher {
    /// job_id -> broadcast sender
    job_channels: DashMap<String, broadcast::Sender<WsEvent>>,
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            job_channels: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 订阅 job 的事件，通道不存在时创建
    pub fn subscribe(&self, job_id: &str) -> broadcast::Receiver<WsEvent> {
        self.job_channels
            .entry(job_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// 订阅者断开后调用，没有其他订阅者时移除通道
    pub fn unsubscribe(&self, job_id: &str) {
        self.job_channels
            .remove_if(job_id, |_, sender| sender.receiver_count() == 0);
    }

    /// 当前有订阅通道的 job 数
    pub fn channel_count(&self) -> usize {
        self.job_channels.len()
    }

    fn publish_event(&self, job_id: &str, event: WsEvent) {
        let terminal = event.is_terminal();
        if let Some(sender) = self.job_channels.get(job_id) {
            let delivered = sender.send(event).unwrap_or(0);
            tracing::debug!(job_id = %job_id, receivers = delivered, "Published job event");
        }
        // 终态之后不会再有事件，已缓冲的消息仍可被接收
        if terminal {
            self.job_channels.remove(job_id);
        }
    }
}

impl JobEventPublisherPort for EventPublisher {
    fn publish(&self, job: &Job) {
        self.publish_event(&job.id, WsEvent::from_job(job));
    }
}
