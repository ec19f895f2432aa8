//! 测试辅助：脚本化 provider 与完整的内存/临时目录装配

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crate::application::commands::handlers::{
    CancelJobHandler, GenerateSpeechHandler, SubmissionConfig,
};
use crate::application::ports::{
    IdempotencyStorePort, JobQueuePort, JobRepositoryPort, ObjectStorePort, ProviderError,
    SynthesisOutput, TtsProviderPort, VoiceInfo,
};
use crate::application::services::{
    ExecutorConfig, HealthAggregator, JobExecutor, ProviderRegistry, ProviderStats,
};
use crate::domain::job::VoiceOptions;
use crate::domain::provider::{CircuitBreakerConfig, CircuitBreakerStore, ProviderDescriptor};
use crate::infrastructure::adapters::storage::{FileObjectStore, FileObjectStoreConfig, UrlSigner};
use crate::infrastructure::events::EventPublisher;
use crate::infrastructure::persistence::sled::{SledIdempotencyStore, SledJobQueue, SledQueueConfig};
use crate::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, SqliteJobRepository,
};

pub const TEST_SIGNING_SECRET: &str = "test-secret";
pub const TEST_PUBLIC_BASE_URL: &str = "http://localhost:5060";

/// 按脚本返回结果的 provider
///
/// 脚本用完后按 fallback 返回：always_err 返回固定错误，其余返回成功
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<SynthesisOutput, ProviderError>>>,
    fallback: Option<ProviderError>,
    delay: Duration,
    voices: Vec<VoiceInfo>,
    calls: AtomicU32,
}

impl ScriptedProvider {
    fn with_script(
        script: Vec<Result<SynthesisOutput, ProviderError>>,
        fallback: Option<ProviderError>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            delay: Duration::ZERO,
            voices: Vec::new(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn always_ok() -> Self {
        Self::with_script(Vec::new(), None)
    }

    pub fn always_err(error: ProviderError) -> Self {
        Self::with_script(Vec::new(), Some(error))
    }

    pub fn scripted(script: Vec<Result<SynthesisOutput, ProviderError>>) -> Self {
        Self::with_script(script, None)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_voices(mut self, provider: &str, ids: &[&str]) -> Self {
        self.voices = ids
            .iter()
            .map(|id| VoiceInfo {
                id: id.to_string(),
                name: id.to_string(),
                language: None,
                provider: provider.to_string(),
            })
            .collect();
        self
    }

    /// 实际调用次数
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn sample_output() -> SynthesisOutput {
    SynthesisOutput {
        audio_data: b"RIFF fake audio".to_vec(),
        content_type: "audio/wav".to_string(),
        duration_ms: Some(1200),
    }
}

#[async_trait]
impl TtsProviderPort for ScriptedProvider {
    async fn synthesize(
        &self,
        _text: &str,
        _options: &VoiceOptions,
    ) -> Result<SynthesisOutput, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        match next {
            Some(result) => result,
            None => match &self.fallback {
                Some(error) => Err(error.clone()),
                None => Ok(sample_output()),
            },
        }
    }

    async fn voices(&self) -> Result<Vec<VoiceInfo>, ProviderError> {
        Ok(self.voices.clone())
    }
}

/// 测试装配：sqlite 内存库、临时 sled、临时目录对象存储
pub struct Harness {
    pub job_repo: Arc<dyn JobRepositoryPort>,
    pub queue: Arc<dyn JobQueuePort>,
    pub idempotency: Arc<dyn IdempotencyStorePort>,
    pub object_store: Arc<dyn ObjectStorePort>,
    pub registry: Arc<ProviderRegistry>,
    pub stats: Arc<ProviderStats>,
    pub events: Arc<EventPublisher>,
    pub executor: Arc<JobExecutor>,
    pub health: HealthAggregator,
    _temp_dir: TempDir,
}

impl Harness {
    pub fn generate_handler(&self, config: SubmissionConfig) -> GenerateSpeechHandler {
        GenerateSpeechHandler::new(
            config,
            self.job_repo.clone(),
            self.idempotency.clone(),
            self.queue.clone(),
            self.object_store.clone(),
            self.executor.clone(),
            self.events.clone(),
        )
    }

    pub fn cancel_handler(&self) -> CancelJobHandler {
        CancelJobHandler::new(
            self.job_repo.clone(),
            self.queue.clone(),
            self.executor.clone(),
            self.events.clone(),
        )
    }
}

pub async fn test_harness(providers: Vec<(ProviderDescriptor, Arc<ScriptedProvider>)>) -> Harness {
    test_harness_with(
        providers,
        ExecutorConfig {
            job_timeout: Duration::from_secs(10),
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(2),
            storage_max_attempts: 2,
        },
    )
    .await
}

pub async fn test_harness_with(
    providers: Vec<(ProviderDescriptor, Arc<ScriptedProvider>)>,
    executor_config: ExecutorConfig,
) -> Harness {
    test_harness_with_breakers(providers, executor_config, CircuitBreakerConfig::default()).await
}

pub async fn test_harness_with_breakers(
    providers: Vec<(ProviderDescriptor, Arc<ScriptedProvider>)>,
    executor_config: ExecutorConfig,
    breaker_config: CircuitBreakerConfig,
) -> Harness {
    let temp_dir = tempfile::tempdir().unwrap();

    let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
    run_migrations(&pool).await.unwrap();
    let job_repo: Arc<dyn JobRepositoryPort> = Arc::new(SqliteJobRepository::new(pool));

    let queue_db = sled::Config::new().temporary(true).open().unwrap();
    let queue: Arc<dyn JobQueuePort> = Arc::new(
        SledJobQueue::from_db(
            queue_db,
            SledQueueConfig {
                lease: Duration::from_secs(60),
                poll_interval: Duration::from_millis(10),
            },
        )
        .unwrap(),
    );

    let idempotency_db = sled::Config::new().temporary(true).open().unwrap();
    let idempotency: Arc<dyn IdempotencyStorePort> = Arc::new(
        SledIdempotencyStore::from_db(&idempotency_db, Duration::from_secs(3600)).unwrap(),
    );

    let signer = UrlSigner::new(
        TEST_SIGNING_SECRET,
        TEST_PUBLIC_BASE_URL,
        Duration::from_secs(3600),
    )
    .unwrap();
    let object_store: Arc<dyn ObjectStorePort> = Arc::new(
        FileObjectStore::new(FileObjectStoreConfig::new(temp_dir.path().join("audio")), signer)
            .await
            .unwrap(),
    );

    let breakers = Arc::new(CircuitBreakerStore::new(breaker_config));
    let registry = Arc::new(providers.into_iter().fold(
        ProviderRegistry::new(breakers),
        |registry, (descriptor, provider)| {
            registry.register(descriptor, provider as Arc<dyn TtsProviderPort>)
        },
    ));

    let stats = Arc::new(ProviderStats::new());
    let events = EventPublisher::new().arc();
    let executor = Arc::new(JobExecutor::new(
        executor_config,
        job_repo.clone(),
        registry.clone(),
        object_store.clone(),
        stats.clone(),
        events.clone(),
    ));
    let health = HealthAggregator::new(
        registry.clone(),
        queue.clone(),
        job_repo.clone(),
        stats.clone(),
    );

    Harness {
        job_repo,
        queue,
        idempotency,
        object_store,
        registry,
        stats,
        events,
        executor,
        health,
        _temp_dir: temp_dir,
    }
}
