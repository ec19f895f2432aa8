//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::provider::{CircuitBreakerConfig, ProviderKind};
use crate::domain::{NormalizeConfig, OverflowPolicy, DEFAULT_MAX_TEXT_LENGTH};

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,

    /// 任务队列配置
    #[serde(default)]
    pub queue: QueueConfig,

    /// 幂等存储配置
    #[serde(default)]
    pub idempotency: IdempotencyConfig,

    /// 请求受理配置
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Worker 配置
    #[serde(default)]
    pub worker: WorkerConfig,

    /// 熔断配置
    #[serde(default)]
    pub circuit: CircuitConfig,

    /// 对象存储配置
    #[serde(default)]
    pub storage: StorageConfig,

    /// 合成 provider 列表
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// 管理接口配置
    #[serde(default)]
    pub admin: AdminConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

impl AppConfig {
    /// 签名 URL 使用的公开地址，storage 未单独配置时沿用 server
    pub fn signed_url_base(&self) -> String {
        self.storage
            .public_base_url
            .clone()
            .unwrap_or_else(|| self.server.public_base_url())
    }
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,

    /// 公开访问的 Base URL（签名 URL 使用）
    /// 如果未设置，则使用 http://{host}:{port}
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5060
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: None,
        }
    }
}

impl ServerConfig {
    /// 获取服务器地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 获取公开的 Base URL
    pub fn public_base_url(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| {
            let host = if self.host == "0.0.0.0" {
                "localhost"
            } else {
                &self.host
            };
            format!("http://{}:{}", host, self.port)
        })
    }
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库文件路径
    #[serde(default = "default_db_path")]
    pub path: String,

    /// 最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/jobs.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// 获取数据库 URL
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.path)
    }
}

/// 任务队列配置
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// sled 数据目录
    #[serde(default = "default_queue_path")]
    pub path: PathBuf,

    /// 租约时长（秒），超时未 ack 的任务会被重新投递
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,

    /// 空队列时的轮询间隔（毫秒）
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_queue_path() -> PathBuf {
    PathBuf::from("data/queue.sled")
}

fn default_lease_secs() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: default_queue_path(),
            lease_secs: default_lease_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// 幂等存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct IdempotencyConfig {
    /// sled 数据目录
    #[serde(default = "default_idempotency_path")]
    pub path: PathBuf,

    /// 条目有效期（秒）
    #[serde(default = "default_idempotency_ttl")]
    pub ttl_secs: u64,

    /// 过期条目清理间隔（秒），0 表示不清理
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

fn default_idempotency_path() -> PathBuf {
    PathBuf::from("data/idempotency.sled")
}

fn default_idempotency_ttl() -> u64 {
    3600
}

fn default_purge_interval() -> u64 {
    600
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            path: default_idempotency_path(),
            ttl_secs: default_idempotency_ttl(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

/// 请求受理配置
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// 归一化后文本的最大字符数
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,

    /// 超长文本策略: reject / truncate
    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// 不超过该字符数的请求在请求路径内同步执行，0 表示关闭
    #[serde(default)]
    pub inline_max_chars: usize,
}

fn default_max_text_length() -> usize {
    DEFAULT_MAX_TEXT_LENGTH
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_text_length: default_max_text_length(),
            overflow: OverflowPolicy::Reject,
            inline_max_chars: 0,
        }
    }
}

impl PipelineConfig {
    pub fn normalize_config(&self) -> NormalizeConfig {
        NormalizeConfig {
            max_length: self.max_text_length,
            overflow: self.overflow,
        }
    }
}

/// Worker 配置
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// 最大并发任务数
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// 单个任务的总超时（秒）
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,

    /// 重试退避基数（毫秒）
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// 重试退避上限（毫秒）
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
}

fn default_concurrency() -> usize {
    5
}

fn default_job_timeout() -> u64 {
    120
}

fn default_backoff_base() -> u64 {
    500
}

fn default_backoff_max() -> u64 {
    8000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            job_timeout_secs: default_job_timeout(),
            backoff_base_ms: default_backoff_base(),
            backoff_max_ms: default_backoff_max(),
        }
    }
}

/// 熔断配置
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitConfig {
    /// 连续失败多少次后熔断
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// 首次熔断冷却时间（秒），之后每次翻倍
    #[serde(default = "default_cooldown_base")]
    pub cooldown_base_secs: u64,

    /// 冷却时间上限（秒）
    #[serde(default = "default_cooldown_max")]
    pub cooldown_max_secs: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown_base() -> u64 {
    30
}

fn default_cooldown_max() -> u64 {
    300
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_base_secs: default_cooldown_base(),
            cooldown_max_secs: default_cooldown_max(),
        }
    }
}

impl CircuitConfig {
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            cooldown_base: Duration::from_secs(self.cooldown_base_secs),
            cooldown_max: Duration::from_secs(self.cooldown_max_secs),
        }
    }
}

/// 对象存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// 音频存储根目录
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    /// 签名 URL 的 Base URL，未设置时使用 server.public_base_url()
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// URL 签名密钥
    #[serde(default)]
    pub signing_secret: String,

    /// 签名 URL 有效期（秒）
    #[serde(default = "default_url_ttl")]
    pub url_ttl_secs: u64,

    /// 超过该大小的音频分片写入
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold_bytes: usize,

    /// 分片大小
    #[serde(default = "default_part_size")]
    pub part_size_bytes: usize,

    /// 分片并发写入数
    #[serde(default = "default_part_concurrency")]
    pub part_concurrency: usize,

    /// 上传失败的最大尝试次数
    #[serde(default = "default_storage_attempts")]
    pub max_attempts: u32,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data/audio")
}

fn default_url_ttl() -> u64 {
    3600
}

fn default_multipart_threshold() -> usize {
    8 * 1024 * 1024 // 8 MB
}

fn default_part_size() -> usize {
    2 * 1024 * 1024 // 2 MB
}

fn default_part_concurrency() -> usize {
    4
}

fn default_storage_attempts() -> u32 {
    3
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            public_base_url: None,
            signing_secret: String::new(),
            url_ttl_secs: default_url_ttl(),
            multipart_threshold_bytes: default_multipart_threshold(),
            part_size_bytes: default_part_size(),
            part_concurrency: default_part_concurrency(),
            max_attempts: default_storage_attempts(),
        }
    }
}

/// 单个 provider 配置
///
/// ```toml
/// [[providers]]
/// name = "eleven"
/// kind = "elevenlabs"
/// api_key = "..."
/// voice = "21m00Tcm4TlvDq8ikWAM"
/// priority = 10
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// 唯一名称，请求中的 provider 偏好按该名称匹配
    pub name: String,

    /// provider 类型
    pub kind: ProviderKind,

    /// 优先级，数值越小越先尝试
    #[serde(default = "default_provider_priority")]
    pub priority: u32,

    /// 服务基础 URL（http 类型必填）
    #[serde(default)]
    pub base_url: Option<String>,

    /// 合成接口路径（仅 http 类型）
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    /// 默认音色
    #[serde(default)]
    pub voice: Option<String>,

    /// 可接受的最大文本长度
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,

    /// 单个任务内对该 provider 的最大调用次数（含首次）
    #[serde(default = "default_provider_attempts")]
    pub max_attempts: u32,

    /// 单次调用超时（秒）
    #[serde(default = "default_call_timeout")]
    pub timeout_secs: u64,

    /// 模拟延迟（毫秒，仅 fake 类型）
    #[serde(default)]
    pub latency_ms: u64,
}

fn default_provider_priority() -> u32 {
    100
}

fn default_provider_attempts() -> u32 {
    3
}

fn default_call_timeout() -> u64 {
    30
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            name: name.into(),
            kind,
            priority: default_provider_priority(),
            base_url: None,
            path: None,
            api_key: None,
            model: None,
            voice: None,
            max_text_length: default_max_text_length(),
            max_attempts: default_provider_attempts(),
            timeout_secs: default_call_timeout(),
            latency_ms: 0,
        }
    }
}

/// 管理接口配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminConfig {
    /// Bearer token，未设置时管理接口不开放
    #[serde(default)]
    pub token: Option<String>,
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
