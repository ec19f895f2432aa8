//! Sled 持久化任务队列
//!
//! 单个 tree 内三类 key：
//! - `e` + [rank][seq BE] -> QueueEntry，按 key 顺序即出队顺序（高优先级在前，同级 FIFO）
//! - `i` + job_id -> entry key
//! - `m:failed` -> 终态失败计数
//!
//! 所有写操作在 `lock` 下执行并通过 Batch 原子提交

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::{Batch, Db, IVec, Tree};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::application::ports::{JobLease, JobQueuePort, QueueError, QueueSnapshot};
use crate::domain::job::Priority;

const ENTRY_PREFIX: u8 = b'e';
const INDEX_PREFIX: u8 = b'i';
const FAILED_KEY: &[u8] = b"m:failed";

/// 队列配置
#[derive(Debug, Clone)]
pub struct SledQueueConfig {
    /// 租约时长
    pub lease: Duration,
    /// 空队列轮询间隔，兜住 lease 过期这类没有通知的情况
    pub poll_interval: Duration,
}

impl Default for SledQueueConfig {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(300),
            poll_interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeaseState {
    token: String,
    expires_at_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QueueEntry {
    job_id: String,
    priority: Priority,
    deliveries: u32,
    lease: Option<LeaseState>,
    enqueued_at_ms: i64,
}

impl QueueEntry {
    fn is_leased(&self, now_ms: i64) -> bool {
        self.lease
            .as_ref()
            .map(|l| l.expires_at_ms > now_ms)
            .unwrap_or(false)
    }
}

fn db_err(e: sled::Error) -> QueueError {
    QueueError::Unavailable(e.to_string())
}

fn decode(bytes: &[u8]) -> Result<QueueEntry, QueueError> {
    bincode::deserialize(bytes).map_err(|e| QueueError::SerializationError(e.to_string()))
}

fn encode(entry: &QueueEntry) -> Result<Vec<u8>, QueueError> {
    bincode::serialize(entry).map_err(|e| QueueError::SerializationError(e.to_string()))
}

fn entry_key(priority: Priority, seq: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(10);
    key.push(ENTRY_PREFIX);
    key.push(priority.rank());
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

fn index_key(job_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(job_id.len() + 1);
    key.push(INDEX_PREFIX);
    key.extend_from_slice(job_id.as_bytes());
    key
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Sled 任务队列
pub struct SledJobQueue {
    db: Db,
    tree: Tree,
    config: SledQueueConfig,
    notify: Notify,
    lock: Mutex<()>,
}

impl SledJobQueue {
    /// 打开（或创建）队列
    pub fn open(path: impl AsRef<Path>, config: SledQueueConfig) -> Result<Self, QueueError> {
        let db = sled::open(path.as_ref()).map_err(db_err)?;
        Self::from_db(db, config)
    }

    pub fn from_db(db: Db, config: SledQueueConfig) -> Result<Self, QueueError> {
        let tree = db.open_tree("job_queue").map_err(db_err)?;
        let queue = Self {
            db,
            tree,
            config,
            notify: Notify::new(),
            lock: Mutex::new(()),
        };

        let snapshot = queue.snapshot_now()?;
        tracing::info!(
            waiting = snapshot.waiting,
            active = snapshot.active,
            failed = snapshot.failed,
            lease_secs = queue.config.lease.as_secs(),
            "SledJobQueue initialized"
        );
        Ok(queue)
    }

    /// 取第一个可投递的条目并加租约
    fn try_lease(&self) -> Result<Option<JobLease>, QueueError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let now = now_ms();

        for item in self.tree.scan_prefix([ENTRY_PREFIX]) {
            let (key, value) = item.map_err(db_err)?;
            let mut entry = decode(&value)?;
            if entry.is_leased(now) {
                continue;
            }

            let token = Uuid::new_v4().to_string();
            entry.deliveries += 1;
            entry.lease = Some(LeaseState {
                token: token.clone(),
                expires_at_ms: now + self.config.lease.as_millis() as i64,
            });
            self.tree.insert(&key, encode(&entry)?).map_err(db_err)?;

            if entry.deliveries > 1 {
                tracing::warn!(
                    job_id = %entry.job_id,
                    deliveries = entry.deliveries,
                    "Redelivering job after lease expiry"
                );
            } else {
                tracing::debug!(
                    job_id = %entry.job_id,
                    wait_ms = now - entry.enqueued_at_ms,
                    "Job leased"
                );
            }

            return Ok(Some(JobLease {
                job_id: entry.job_id,
                token,
                deliveries: entry.deliveries,
                priority: entry.priority,
            }));
        }

        Ok(None)
    }

    /// 查找 job 对应的条目
    fn find(&self, job_id: &str) -> Result<Option<(IVec, QueueEntry)>, QueueError> {
        let Some(key) = self.tree.get(index_key(job_id)).map_err(db_err)? else {
            return Ok(None);
        };
        match self.tree.get(&key).map_err(db_err)? {
            Some(value) => Ok(Some((key, decode(&value)?))),
            None => Ok(None),
        }
    }

    /// 删除持有该 lease 的条目，可选地增加失败计数
    fn settle(&self, lease: &JobLease, count_failure: bool) -> Result<(), QueueError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let (key, entry) = self
            .find(&lease.job_id)?
            .ok_or_else(|| QueueError::LeaseNotFound(lease.job_id.clone()))?;
        let holds = entry
            .lease
            .as_ref()
            .map(|l| l.token == lease.token)
            .unwrap_or(false);
        if !holds {
            return Err(QueueError::LeaseNotFound(lease.job_id.clone()));
        }

        let mut batch = Batch::default();
        batch.remove(key);
        batch.remove(index_key(&lease.job_id));
        if count_failure {
            let failed = self.failed_count()? + 1;
            batch.insert(FAILED_KEY, failed.to_be_bytes().to_vec());
        }
        self.tree.apply_batch(batch).map_err(db_err)?;
        Ok(())
    }

    fn failed_count(&self) -> Result<u64, QueueError> {
        Ok(self
            .tree
            .get(FAILED_KEY)
            .map_err(db_err)?
            .and_then(|v| <[u8; 8]>::try_from(v.as_ref()).ok())
            .map(u64::from_be_bytes)
            .unwrap_or(0))
    }

    fn snapshot_now(&self) -> Result<QueueSnapshot, QueueError> {
        let now = now_ms();
        let mut snapshot = QueueSnapshot {
            failed: self.failed_count()?,
            ..Default::default()
        };
        for item in self.tree.scan_prefix([ENTRY_PREFIX]) {
            let (_, value) = item.map_err(db_err)?;
            if decode(&value)?.is_leased(now) {
                snapshot.active += 1;
            } else {
                snapshot.waiting += 1;
            }
        }
        Ok(snapshot)
    }

    /// 刷新数据库
    pub fn flush(&self) -> Result<(), QueueError> {
        self.db.flush().map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl JobQueuePort for SledJobQueue {
    async fn enqueue(&self, job_id: &str, priority: Priority) -> Result<(), QueueError> {
        {
            let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

            if self.tree.contains_key(index_key(job_id)).map_err(db_err)? {
                tracing::debug!(job_id = %job_id, "Job already enqueued");
                return Ok(());
            }

            let seq = self.db.generate_id().map_err(db_err)?;
            let key = entry_key(priority, seq);
            let entry = QueueEntry {
                job_id: job_id.to_string(),
                priority,
                deliveries: 0,
                lease: None,
                enqueued_at_ms: now_ms(),
            };

            let mut batch = Batch::default();
            batch.insert(key.as_slice(), encode(&entry)?);
            batch.insert(index_key(job_id), key.as_slice());
            self.tree.apply_batch(batch).map_err(db_err)?;
        }

        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self) -> Result<JobLease, QueueError> {
        loop {
            if let Some(lease) = self.try_lease()? {
                return Ok(lease);
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    async fn ack(&self, lease: &JobLease) -> Result<(), QueueError> {
        self.settle(lease, false)
    }

    async fn fail(&self, lease: &JobLease) -> Result<(), QueueError> {
        self.settle(lease, true)
    }

    async fn cancel(&self, job_id: &str) -> Result<bool, QueueError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let Some((key, entry)) = self.find(job_id)? else {
            return Ok(false);
        };
        if entry.is_leased(now_ms()) {
            return Ok(false);
        }

        let mut batch = Batch::default();
        batch.remove(key);
        batch.remove(index_key(job_id));
        self.tree.apply_batch(batch).map_err(db_err)?;
        Ok(true)
    }

    async fn snapshot(&self) -> Result<QueueSnapshot, QueueError> {
        self.snapshot_now()
    }

    async fn ping(&self) -> Result<(), QueueError> {
        self.tree.get(FAILED_KEY).map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn queue_with_lease(lease: Duration) -> SledJobQueue {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let config = SledQueueConfig {
            lease,
            poll_interval: Duration::from_millis(10),
        };
        SledJobQueue::from_db(db, config).unwrap()
    }

    fn queue() -> SledJobQueue {
        queue_with_lease(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_high_priority_first_then_fifo() {
        let queue = queue();
        queue.enqueue("n1", Priority::Normal).await.unwrap();
        queue.enqueue("n2", Priority::Normal).await.unwrap();
        queue.enqueue("h1", Priority::High).await.unwrap();
        queue.enqueue("h2", Priority::High).await.unwrap();

        let mut order = Vec::new();
        for _ in 0..4 {
            order.push(queue.dequeue().await.unwrap().job_id);
        }
        assert_eq!(order, vec!["h1", "h2", "n1", "n2"]);
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent() {
        let queue = queue();
        queue.enqueue("job", Priority::Normal).await.unwrap();
        queue.enqueue("job", Priority::Normal).await.unwrap();
        assert_eq!(queue.snapshot().await.unwrap().waiting, 1);
    }

    #[tokio::test]
    async fn test_leased_entry_invisible_until_ack() {
        let queue = queue();
        queue.enqueue("job", Priority::Normal).await.unwrap();

        let lease = queue.dequeue().await.unwrap();
        assert_eq!(lease.deliveries, 1);
        assert_eq!(
            queue.snapshot().await.unwrap(),
            QueueSnapshot { waiting: 0, active: 1, failed: 0 }
        );
        assert!(queue.try_lease().unwrap().is_none());

        queue.ack(&lease).await.unwrap();
        assert_eq!(queue.snapshot().await.unwrap(), QueueSnapshot::default());
        assert!(matches!(
            queue.ack(&lease).await,
            Err(QueueError::LeaseNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_lease_is_redelivered() {
        let queue = queue_with_lease(Duration::from_millis(30));
        queue.enqueue("job", Priority::Normal).await.unwrap();

        let first = queue.dequeue().await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(queue.snapshot().await.unwrap().waiting, 1);

        let second = queue.dequeue().await.unwrap();
        assert_eq!(second.job_id, "job");
        assert_eq!(second.deliveries, 2);
        assert_ne!(first.token, second.token);

        // 旧 token 不能再 ack
        assert!(queue.ack(&first).await.is_err());
        queue.ack(&second).await.unwrap();
    }

    #[tokio::test]
    async fn test_fail_counts_failures() {
        let queue = queue();
        queue.enqueue("job", Priority::High).await.unwrap();
        let lease = queue.dequeue().await.unwrap();
        queue.fail(&lease).await.unwrap();

        assert_eq!(
            queue.snapshot().await.unwrap(),
            QueueSnapshot { waiting: 0, active: 0, failed: 1 }
        );
    }

    #[tokio::test]
    async fn test_cancel_only_unleased() {
        let queue = queue();
        queue.enqueue("a", Priority::Normal).await.unwrap();
        queue.enqueue("b", Priority::Normal).await.unwrap();

        let lease = queue.dequeue().await.unwrap();
        assert_eq!(lease.job_id, "a");
        assert!(!queue.cancel("a").await.unwrap());
        assert!(queue.cancel("b").await.unwrap());
        assert!(!queue.cancel("b").await.unwrap());
        assert!(!queue.cancel("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_enqueue() {
        let queue = Arc::new(queue());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        queue.enqueue("late", Priority::Normal).await.unwrap();
        let lease = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(lease.job_id, "late");
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("queue.sled");
        {
            let queue = SledJobQueue::open(&path, SledQueueConfig::default()).unwrap();
            queue.enqueue("persisted", Priority::Normal).await.unwrap();
            queue.flush().unwrap();
        }

        let queue = SledJobQueue::open(&path, SledQueueConfig::default()).unwrap();
        assert_eq!(queue.dequeue().await.unwrap().job_id, "persisted");
    }
}
