//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml / config.local.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 环境变量前缀
const ENV_PREFIX: &str = "TTSP";

/// 加载应用配置
///
/// # 环境变量示例
/// - `TTSP_SERVER__PORT=8080`
/// - `TTSP_STORAGE__SIGNING_SECRET=...`
/// - `TTSP_WORKER__CONCURRENCY=10`
/// - `TTSP_ADMIN__TOKEN=...`
///
/// provider 列表只能在配置文件中以 `[[providers]]` 声明
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// `config_path` 为 None 时按默认文件名搜索，文件不存在不报错
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    builder = builder
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 5060)?
        .set_default("database.path", "data/jobs.db")?
        .set_default("database.max_connections", 5)?
        .set_default("queue.path", "data/queue.sled")?
        .set_default("queue.lease_secs", 300)?
        .set_default("idempotency.path", "data/idempotency.sled")?
        .set_default("idempotency.ttl_secs", 3600)?
        .set_default("worker.concurrency", 5)?
        .set_default("worker.job_timeout_secs", 120)?
        .set_default("storage.root", "data/audio")?
        .set_default("storage.url_ttl_secs", 3600)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 例如: TTSP_STORAGE__SIGNING_SECRET=xxx，变量名会被转换为小写
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// 验证配置有效性
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("Server port cannot be 0"));
    }

    if config.database.path.is_empty() {
        return Err(invalid("Database path cannot be empty"));
    }

    if config.providers.is_empty() {
        return Err(invalid("At least one provider must be configured"));
    }

    let mut names = HashSet::new();
    for provider in &config.providers {
        if provider.name.trim().is_empty() {
            return Err(invalid("Provider name cannot be empty"));
        }
        if !names.insert(provider.name.as_str()) {
            return Err(invalid(format!("Duplicate provider name: {}", provider.name)));
        }
        if provider.max_attempts == 0 {
            return Err(invalid(format!(
                "Provider {} max_attempts must be at least 1",
                provider.name
            )));
        }
    }

    if config.storage.signing_secret.is_empty() {
        return Err(invalid("storage.signing_secret must be set"));
    }

    if config.storage.part_size_bytes == 0 || config.storage.part_concurrency == 0 {
        return Err(invalid("storage part size and concurrency must be positive"));
    }

    if config.pipeline.max_text_length == 0 {
        return Err(invalid("pipeline.max_text_length cannot be 0"));
    }

    if config.worker.concurrency == 0 {
        return Err(invalid("worker.concurrency cannot be 0"));
    }

    // lease 先于 job 超时到期会导致仍在处理的 job 被重复投递
    if config.worker.job_timeout_secs >= config.queue.lease_secs {
        return Err(invalid(format!(
            "worker.job_timeout_secs ({}) must be shorter than queue.lease_secs ({})",
            config.worker.job_timeout_secs, config.queue.lease_secs
        )));
    }

    // 幂等条目至少覆盖一个租约周期
    if config.idempotency.ttl_secs <= config.queue.lease_secs {
        return Err(invalid(format!(
            "idempotency.ttl_secs ({}) must be longer than queue.lease_secs ({})",
            config.idempotency.ttl_secs, config.queue.lease_secs
        )));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志），密钥不输出
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Server: {}:{}", config.server.host, config.server.port);
    tracing::info!("Public Base URL: {}", config.signed_url_base());
    tracing::info!("Database: {}", config.database.path);
    tracing::info!("Queue: {:?} (lease {}s)", config.queue.path, config.queue.lease_secs);
    tracing::info!(
        "Idempotency: {:?} (ttl {}s)",
        config.idempotency.path,
        config.idempotency.ttl_secs
    );
    tracing::info!(
        "Pipeline: max_text_length={} overflow={:?} inline_max_chars={}",
        config.pipeline.max_text_length,
        config.pipeline.overflow,
        config.pipeline.inline_max_chars
    );
    tracing::info!(
        "Worker: concurrency={} job_timeout={}s",
        config.worker.concurrency,
        config.worker.job_timeout_secs
    );
    tracing::info!("Audio Directory: {:?}", config.storage.root);
    tracing::info!("Signing Secret: {}", redact(&config.storage.signing_secret));
    for provider in &config.providers {
        tracing::info!(
            "Provider: {} kind={} priority={} api_key={}",
            provider.name,
            provider.kind,
            provider.priority,
            provider.api_key.as_deref().map(redact).unwrap_or("<none>")
        );
    }
    tracing::info!(
        "Admin API: {}",
        if config.admin.token.as_deref().is_some_and(|t| !t.is_empty()) {
            "enabled"
        } else {
            "disabled"
        }
    );
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<none>"
    } else {
        "<redacted>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ProviderConfig;
    use crate::domain::provider::ProviderKind;
    use std::io::Write;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.providers = vec![ProviderConfig::new("local", ProviderKind::Fake)];
        config.storage.signing_secret = "secret".to_string();
        config
    }

    #[test]
    fn test_load_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5060);
    }

    #[test]
    fn test_validation_passes_for_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_port() {
        let mut config = valid_config();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_requires_providers_and_secret() {
        let mut config = valid_config();
        config.providers.clear();
        assert!(validate_config(&config).is_err());

        let mut config = valid_config();
        config.storage.signing_secret.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_rejects_duplicate_provider_names() {
        let mut config = valid_config();
        config
            .providers
            .push(ProviderConfig::new("local", ProviderKind::Browser));
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("Duplicate provider name"));
    }

    #[test]
    fn test_validation_job_timeout_shorter_than_lease() {
        let mut config = valid_config();
        config.worker.job_timeout_secs = config.queue.lease_secs;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_idempotency_ttl_longer_than_lease() {
        let mut config = valid_config();
        config.idempotency.ttl_secs = config.queue.lease_secs;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("idempotency.ttl_secs"));

        config.idempotency.ttl_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_empty_db_path() {
        let mut config = valid_config();
        config.database.path = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
[server]
port = 7070

[storage]
signing_secret = "file-secret"

[worker]
concurrency = 2

[[providers]]
name = "primary"
kind = "http"
base_url = "http://127.0.0.1:8000"
priority = 1

[[providers]]
name = "backup"
kind = "fake"
"#
        )
        .unwrap();

        let config = load_config_from_path(Some(&path)).unwrap();
        assert_eq!(config.server.port, 7070);
        assert_eq!(config.worker.concurrency, 2);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].kind, ProviderKind::Http);
        assert_eq!(config.providers[1].max_attempts, 3);
        assert_eq!(config.queue.lease_secs, 300);
    }
}
