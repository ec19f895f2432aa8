//! TTS Pipeline - 服务入口
//!
//! 装配顺序：配置 -> 日志 -> 存储 -> provider -> 执行器 -> worker -> HTTP

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tts_pipeline::application::{
    ExecutorConfig, HealthAggregator, IdempotencyStorePort, JobExecutor, JobQueuePort,
    JobRepositoryPort, ObjectStorePort, ProviderRegistry, ProviderStats, SubmissionConfig,
};
use tts_pipeline::config::{load_config, print_config, AppConfig};
use tts_pipeline::domain::provider::CircuitBreakerStore;
use tts_pipeline::infrastructure::adapters::storage::{
    FileObjectStore, FileObjectStoreConfig, UrlSigner,
};
use tts_pipeline::infrastructure::adapters::tts::build_provider;
use tts_pipeline::infrastructure::events::EventPublisher;
use tts_pipeline::infrastructure::http::{AppComponents, AppState, HttpServer};
use tts_pipeline::infrastructure::persistence::sled::{
    SledIdempotencyStore, SledJobQueue, SledQueueConfig,
};
use tts_pipeline::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, SqliteJobRepository,
};
use tts_pipeline::infrastructure::worker::{
    run_idempotency_sweeper, SynthesisWorker, SynthesisWorkerConfig,
};

fn init_tracing(config: &AppConfig) {
    let log_filter = format!(
        "{},tts_pipeline={},tower_http=debug,sqlx=warn",
        config.log.level, config.log.level
    );
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if config.log.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "TTS Pipeline starting");
    print_config(&config);

    // 确保数据目录存在
    tokio::fs::create_dir_all(&config.storage.root).await?;
    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // Job 记录
    let db_config = DatabaseConfig {
        database_url: config.database.database_url(),
        max_connections: config.database.max_connections,
    };
    let pool = create_pool(&db_config).await?;
    run_migrations(&pool).await?;
    let job_repo: Arc<dyn JobRepositoryPort> = Arc::new(SqliteJobRepository::new(pool));

    // 队列与幂等表
    let queue: Arc<dyn JobQueuePort> = Arc::new(SledJobQueue::open(
        &config.queue.path,
        SledQueueConfig {
            lease: Duration::from_secs(config.queue.lease_secs),
            poll_interval: Duration::from_millis(config.queue.poll_interval_ms),
        },
    )?);
    let idempotency: Arc<dyn IdempotencyStorePort> = Arc::new(SledIdempotencyStore::open(
        &config.idempotency.path,
        Duration::from_secs(config.idempotency.ttl_secs),
    )?);

    // 对象存储
    let signer = UrlSigner::new(
        &config.storage.signing_secret,
        config.signed_url_base(),
        Duration::from_secs(config.storage.url_ttl_secs),
    )?;
    let store_config = FileObjectStoreConfig {
        root: config.storage.root.clone(),
        multipart_threshold: config.storage.multipart_threshold_bytes,
        part_size: config.storage.part_size_bytes,
        part_concurrency: config.storage.part_concurrency,
    };
    let object_store: Arc<dyn ObjectStorePort> =
        Arc::new(FileObjectStore::new(store_config, signer).await?);

    // Provider 注册表
    let breakers = Arc::new(CircuitBreakerStore::new(config.circuit.breaker_config()));
    let mut registry = ProviderRegistry::new(breakers);
    for provider_config in &config.providers {
        let (descriptor, client) = build_provider(provider_config)?;
        registry = registry.register(descriptor, client);
    }
    let registry = Arc::new(registry);

    let stats = Arc::new(ProviderStats::new());
    let event_publisher = EventPublisher::new().arc();

    let executor = Arc::new(JobExecutor::new(
        ExecutorConfig {
            job_timeout: Duration::from_secs(config.worker.job_timeout_secs),
            backoff_base: Duration::from_millis(config.worker.backoff_base_ms),
            backoff_max: Duration::from_millis(config.worker.backoff_max_ms),
            storage_max_attempts: config.storage.max_attempts,
        },
        job_repo.clone(),
        registry.clone(),
        object_store.clone(),
        stats.clone(),
        event_publisher.clone(),
    ));

    // 后台任务
    let shutdown = CancellationToken::new();

    let worker = SynthesisWorker::new(
        SynthesisWorkerConfig {
            concurrency: config.worker.concurrency,
        },
        queue.clone(),
        executor.clone(),
        shutdown.child_token(),
    );
    let worker_handle = tokio::spawn(worker.run());

    let sweeper_handle = tokio::spawn(run_idempotency_sweeper(
        idempotency.clone(),
        job_repo.clone(),
        Duration::from_secs(config.idempotency.purge_interval_secs),
        shutdown.child_token(),
    ));

    // HTTP 服务器
    let state = AppState::new(AppComponents {
        submission: SubmissionConfig {
            normalize: config.pipeline.normalize_config(),
            inline_max_chars: config.pipeline.inline_max_chars,
        },
        job_repo: job_repo.clone(),
        idempotency,
        queue: queue.clone(),
        object_store,
        executor,
        health: HealthAggregator::new(registry, queue, job_repo, stats),
        event_publisher,
        admin_token: config.admin.token.clone(),
    });

    let server = HttpServer::new(config.server.clone(), state);

    let server_shutdown = shutdown.clone();
    server
        .run_with_shutdown(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Failed to listen for ctrl-c");
                    }
                    tracing::info!("Received shutdown signal");
                }
                _ = server_shutdown.cancelled() => {}
            }
        })
        .await?;

    // 停止拉取新任务，等待处理中的 job 结束
    shutdown.cancel();
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Worker task failed");
    }
    if let Err(e) = sweeper_handle.await {
        tracing::error!(error = %e, "Sweeper task failed");
    }

    tracing::info!("Shutdown complete");

    Ok(())
}
