//! Object Store Port - 音频对象存储
//!
//! 负责上传音频并签发限时访问 URL

use async_trait::async_trait;
use thiserror::Error;

/// 存储错误
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Signed URL expired")]
    Expired,

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(e.to_string())
        } else {
            StorageError::IoError(e.to_string())
        }
    }
}

/// 上传结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// 生成的 key，与 job id 无关
    pub key: String,
    /// 签名 URL
    pub url: String,
    pub size_bytes: u64,
}

/// 读取结果
#[derive(Debug, Clone)]
pub struct StoredAudio {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Object Store Port
#[async_trait]
pub trait ObjectStorePort: Send + Sync {
    /// 上传音频，小文件一次写入，大文件分片写入
    async fn store(&self, data: &[u8], content_type: &str) -> Result<StoredObject, StorageError>;

    /// 为已有对象签发新的限时 URL
    fn sign_url(&self, key: &str) -> String;

    /// 校验签名与过期时间
    fn verify(&self, key: &str, expires: i64, signature: &str) -> Result<(), StorageError>;

    async fn read(&self, key: &str) -> Result<StoredAudio, StorageError>;

    async fn ping(&self) -> Result<(), StorageError>;
}
