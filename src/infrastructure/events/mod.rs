//! Events - job 状态推送

mod publisher;

pub use publisher::{EventPublisher, WsEvent};
