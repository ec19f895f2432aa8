//! File Object Store - 文件系统对象存储
//!
//! 实现 ObjectStorePort：
//! - key 形如 `{yyyy}/{mm}/{dd}/{uuid}.{ext}`
//! - 小文件写临时文件后 rename
//! - 大文件按分片并发写入后拼装

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::UrlSigner;
use crate::application::ports::{ObjectStorePort, StorageError, StoredAudio, StoredObject};

/// 分片临时目录
const PARTS_DIR: &str = ".parts";

const CONTENT_TYPES: &[(&str, &str)] = &[
    ("audio/mpeg", "mp3"),
    ("audio/mp3", "mp3"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
    ("audio/wave", "wav"),
    ("audio/ogg", "ogg"),
    ("audio/opus", "opus"),
    ("audio/flac", "flac"),
    ("audio/aac", "aac"),
    ("audio/webm", "webm"),
];

fn extension_for(content_type: &str) -> &'static str {
    CONTENT_TYPES
        .iter()
        .find(|(ct, _)| content_type.eq_ignore_ascii_case(ct))
        .map(|(_, ext)| *ext)
        .unwrap_or("bin")
}

fn content_type_for(key: &str) -> &'static str {
    let ext = Path::new(key)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    CONTENT_TYPES
        .iter()
        .find(|(_, e)| *e == ext)
        .map(|(ct, _)| *ct)
        .unwrap_or("application/octet-stream")
}

/// 对象存储配置
#[derive(Debug, Clone)]
pub struct FileObjectStoreConfig {
    pub root: PathBuf,
    /// 超过该大小走分片写入
    pub multipart_threshold: usize,
    pub part_size: usize,
    pub part_concurrency: usize,
}

impl FileObjectStoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            multipart_threshold: 8 * 1024 * 1024,
            part_size: 2 * 1024 * 1024,
            part_concurrency: 4,
        }
    }
}

/// 文件系统对象存储
pub struct FileObjectStore {
    config: FileObjectStoreConfig,
    signer: UrlSigner,
}

impl FileObjectStore {
    /// 创建存储，确保根目录存在
    pub async fn new(config: FileObjectStoreConfig, signer: UrlSigner) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.root).await?;
        Ok(Self { config, signer })
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    fn generate_key(content_type: &str) -> String {
        format!(
            "{}/{}.{}",
            Utc::now().format("%Y/%m/%d"),
            Uuid::new_v4(),
            extension_for(content_type)
        )
    }

    /// key -> 文件路径，拒绝绝对路径和 `..`
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() || key.starts_with(PARTS_DIR) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        let relative = Path::new(key);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.config.root.join(relative))
    }

    async fn write_single(&self, path: &Path, data: &[u8]) -> Result<(), StorageError> {
        let tmp = tmp_path(path);
        fs::write(&tmp, data).await?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn write_multipart(&self, path: &Path, data: &[u8]) -> Result<usize, StorageError> {
        let upload_dir = self.config.root.join(PARTS_DIR).join(Uuid::new_v4().to_string());
        fs::create_dir_all(&upload_dir).await?;

        let result = self.upload_and_assemble(&upload_dir, path, data).await;
        let _ = fs::remove_dir_all(&upload_dir).await;
        result
    }

    async fn upload_and_assemble(
        &self,
        upload_dir: &Path,
        path: &Path,
        data: &[u8],
    ) -> Result<usize, StorageError> {
        let part_size = self.config.part_size.max(1);
        // 每个分片持有自己的数据，future 不借用调用方
        let uploads: Vec<_> = data
            .chunks(part_size)
            .enumerate()
            .map(|(index, chunk)| {
                let part_path = upload_dir.join(part_name(index));
                let chunk = chunk.to_vec();
                async move { fs::write(part_path, chunk).await }
            })
            .collect();
        let part_count = uploads.len();

        let results: Vec<Result<(), std::io::Error>> = stream::iter(uploads)
            .buffer_unordered(self.config.part_concurrency.max(1))
            .collect()
            .await;
        for result in results {
            result?;
        }

        let tmp = tmp_path(path);
        let mut file = fs::File::create(&tmp).await?;
        for index in 0..part_count {
            let part = fs::read(upload_dir.join(part_name(index))).await?;
            file.write_all(&part).await?;
        }
        file.flush().await?;
        drop(file);

        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(part_count)
    }
}

fn part_name(index: usize) -> String {
    format!("part_{:06}", index)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".tmp-{}", Uuid::new_v4()));
    path.with_file_name(name)
}

#[async_trait]
impl ObjectStorePort for FileObjectStore {
    async fn store(&self, data: &[u8], content_type: &str) -> Result<StoredObject, StorageError> {
        let key = Self::generate_key(content_type);
        let path = self.resolve(&key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if data.len() > self.config.multipart_threshold {
            let parts = self.write_multipart(&path, data).await?;
            tracing::debug!(key = %key, size = data.len(), parts, "Stored audio (multipart)");
        } else {
            self.write_single(&path, data).await?;
            tracing::debug!(key = %key, size = data.len(), "Stored audio");
        }

        Ok(StoredObject {
            url: self.signer.sign(&key),
            key,
            size_bytes: data.len() as u64,
        })
    }

    fn sign_url(&self, key: &str) -> String {
        self.signer.sign(key)
    }

    fn verify(&self, key: &str, expires: i64, signature: &str) -> Result<(), StorageError> {
        self.signer.verify(key, expires, signature)
    }

    async fn read(&self, key: &str) -> Result<StoredAudio, StorageError> {
        let path = self.resolve(key)?;
        let data = fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
            _ => StorageError::IoError(e.to_string()),
        })?;
        Ok(StoredAudio {
            data,
            content_type: content_type_for(key).to_string(),
        })
    }

    async fn ping(&self) -> Result<(), StorageError> {
        let metadata = fs::metadata(&self.config.root).await?;
        if metadata.is_dir() {
            Ok(())
        } else {
            Err(StorageError::IoError(format!(
                "{} is not a directory",
                self.config.root.display()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    async fn store_in(root: &Path, threshold: usize, part_size: usize) -> FileObjectStore {
        let signer =
            UrlSigner::new("secret", "http://localhost:5060", Duration::from_secs(3600)).unwrap();
        let config = FileObjectStoreConfig {
            root: root.to_path_buf(),
            multipart_threshold: threshold,
            part_size,
            part_concurrency: 3,
        };
        FileObjectStore::new(config, signer).await.unwrap()
    }

    #[tokio::test]
    async fn test_store_and_read_single_shot() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path(), 1024, 256).await;

        let stored = store.store(b"fake mp3 data", "audio/mpeg").await.unwrap();
        assert!(stored.key.ends_with(".mp3"));
        assert_eq!(stored.key.split('/').count(), 4);
        assert!(stored.url.contains(&stored.key));
        assert_eq!(stored.size_bytes, 13);

        let audio = store.read(&stored.key).await.unwrap();
        assert_eq!(audio.data, b"fake mp3 data");
        assert_eq!(audio.content_type, "audio/mpeg");
    }

    #[tokio::test]
    async fn test_multipart_assembles_in_order() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path(), 100, 64).await;

        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let stored = store.store(&data, "audio/wav").await.unwrap();

        let audio = store.read(&stored.key).await.unwrap();
        assert_eq!(audio.data, data);
        assert_eq!(audio.content_type, "audio/wav");

        // 分片临时目录已清理
        let mut leftovers = fs::read_dir(temp_dir.path().join(PARTS_DIR)).await.unwrap();
        assert!(leftovers.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_multipart_store_from_spawned_task() {
        let temp_dir = tempdir().unwrap();
        let store: std::sync::Arc<dyn ObjectStorePort> =
            std::sync::Arc::new(store_in(temp_dir.path(), 16, 7).await);

        // 最后一个分片不足 part_size
        let data: Vec<u8> = (0..100u8).collect();
        let worker_store = store.clone();
        let worker_data = data.clone();
        let stored = tokio::spawn(async move {
            worker_store.store(&worker_data, "audio/mpeg").await
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(stored.size_bytes, 100);

        let audio = store.read(&stored.key).await.unwrap();
        assert_eq!(audio.data, data);
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path(), 1024, 256).await;

        assert!(matches!(
            store.read("../secret.txt").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            store.read("/etc/passwd").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            store.read("2024/01/01/missing.mp3").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_content_type_falls_back_to_bin() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path(), 1024, 256).await;

        let stored = store.store(b"x", "application/x-custom").await.unwrap();
        assert!(stored.key.ends_with(".bin"));
        assert!(store.ping().await.is_ok());
    }
}
