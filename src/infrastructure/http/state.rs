//! Application State
//!
//! HTTP 层共享的命令/查询处理器

use std::sync::Arc;

use crate::application::{
    // Command handlers
    CancelJobHandler, GenerateSpeechHandler, SubmissionConfig,
    // Query handlers
    GetAudioHandler, GetJobHandler, ListVoicesHandler,
    // Services
    HealthAggregator, JobExecutor,
    // Ports
    IdempotencyStorePort, JobQueuePort, JobRepositoryPort, ObjectStorePort,
};
use crate::infrastructure::events::EventPublisher;

/// 应用状态
pub struct AppState {
    pub event_publisher: Arc<EventPublisher>,
    pub health: HealthAggregator,
    /// 为空时管理接口不注册
    pub admin_token: Option<String>,

    // ========== Command Handlers ==========
    pub generate_handler: GenerateSpeechHandler,
    pub cancel_handler: CancelJobHandler,

    // ========== Query Handlers ==========
    pub get_job_handler: GetJobHandler,
    pub list_voices_handler: ListVoicesHandler,
    pub get_audio_handler: GetAudioHandler,
}

/// 构造 AppState 所需的组件
pub struct AppComponents {
    pub submission: SubmissionConfig,
    pub job_repo: Arc<dyn JobRepositoryPort>,
    pub idempotency: Arc<dyn IdempotencyStorePort>,
    pub queue: Arc<dyn JobQueuePort>,
    pub object_store: Arc<dyn ObjectStorePort>,
    pub executor: Arc<JobExecutor>,
    pub health: HealthAggregator,
    pub event_publisher: Arc<EventPublisher>,
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn new(components: AppComponents) -> Self {
        let AppComponents {
            submission,
            job_repo,
            idempotency,
            queue,
            object_store,
            executor,
            health,
            event_publisher,
            admin_token,
        } = components;

        Self {
            generate_handler: GenerateSpeechHandler::new(
                submission,
                job_repo.clone(),
                idempotency,
                queue.clone(),
                object_store.clone(),
                executor.clone(),
                event_publisher.clone(),
            ),
            cancel_handler: CancelJobHandler::new(
                job_repo.clone(),
                queue,
                executor.clone(),
                event_publisher.clone(),
            ),
            get_job_handler: GetJobHandler::new(job_repo, object_store.clone()),
            list_voices_handler: ListVoicesHandler::new(executor.registry().clone()),
            get_audio_handler: GetAudioHandler::new(object_store),
            event_publisher,
            health,
            admin_token: admin_token.filter(|token| !token.is_empty()),
        }
    }

    pub fn admin_enabled(&self) -> bool {
        self.admin_token.is_some()
    }
}
