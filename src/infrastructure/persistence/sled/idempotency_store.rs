//! Sled 幂等存储
//!
//! fingerprint -> (job_id, expires_at_ms)，写入全部走 compare_and_swap
//!
//! 过期条目保留到被 replace 接管或 release 删除，job 仍在进行中时可以续期

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::{Db, IVec, Tree};
use std::path::Path;
use std::time::Duration;

use crate::application::ports::{IdempotencyError, IdempotencyStorePort};
use crate::domain::job::RequestFingerprint;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdempotencyEntry {
    job_id: String,
    expires_at_ms: i64,
}

impl IdempotencyEntry {
    fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at_ms > now_ms
    }
}

fn db_err(e: sled::Error) -> IdempotencyError {
    IdempotencyError::DatabaseError(e.to_string())
}

fn decode(bytes: &[u8]) -> Result<IdempotencyEntry, IdempotencyError> {
    bincode::deserialize(bytes).map_err(|e| IdempotencyError::SerializationError(e.to_string()))
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Sled 幂等存储
pub struct SledIdempotencyStore {
    tree: Tree,
    ttl: Duration,
}

impl SledIdempotencyStore {
    pub fn open(path: impl AsRef<Path>, ttl: Duration) -> Result<Self, IdempotencyError> {
        let db = sled::open(path.as_ref()).map_err(db_err)?;
        Self::from_db(&db, ttl)
    }

    pub fn from_db(db: &Db, ttl: Duration) -> Result<Self, IdempotencyError> {
        let tree = db.open_tree("idempotency").map_err(db_err)?;
        tracing::info!(entries = tree.len(), ttl_secs = ttl.as_secs(), "SledIdempotencyStore initialized");
        Ok(Self { tree, ttl })
    }

    fn encode_new(&self, job_id: &str) -> Result<Vec<u8>, IdempotencyError> {
        let entry = IdempotencyEntry {
            job_id: job_id.to_string(),
            expires_at_ms: now_ms() + self.ttl.as_millis() as i64,
        };
        bincode::serialize(&entry).map_err(|e| IdempotencyError::SerializationError(e.to_string()))
    }

    fn live_entry(&self, current: &Option<IVec>) -> Result<Option<IdempotencyEntry>, IdempotencyError> {
        match current {
            Some(bytes) => {
                let entry = decode(bytes)?;
                Ok(entry.is_live(now_ms()).then_some(entry))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl IdempotencyStorePort for SledIdempotencyStore {
    async fn lookup(
        &self,
        fingerprint: &RequestFingerprint,
    ) -> Result<Option<String>, IdempotencyError> {
        let current = self.tree.get(fingerprint.as_str()).map_err(db_err)?;
        Ok(self.live_entry(&current)?.map(|e| e.job_id))
    }

    async fn reserve(
        &self,
        fingerprint: &RequestFingerprint,
        job_id: &str,
    ) -> Result<(), IdempotencyError> {
        let new_value = self.encode_new(job_id)?;
        let current = self.tree.get(fingerprint.as_str()).map_err(db_err)?;
        if let Some(bytes) = &current {
            let holder = decode(bytes)?;
            return Err(if holder.is_live(now_ms()) {
                IdempotencyError::AlreadyExists(holder.job_id)
            } else {
                IdempotencyError::Expired(holder.job_id)
            });
        }

        // 只从空位 CAS 抢占；失败说明有并发写入，赢家即为持有者
        match self
            .tree
            .compare_and_swap(fingerprint.as_str(), None as Option<IVec>, Some(new_value))
            .map_err(db_err)?
        {
            Ok(()) => Ok(()),
            Err(conflict) => match conflict.current {
                Some(bytes) => Err(IdempotencyError::AlreadyExists(decode(&bytes)?.job_id)),
                None => Err(IdempotencyError::DatabaseError(
                    "concurrent reservation vanished".to_string(),
                )),
            },
        }
    }

    async fn replace(
        &self,
        fingerprint: &RequestFingerprint,
        expected_job_id: &str,
        new_job_id: &str,
    ) -> Result<(), IdempotencyError> {
        let new_value = self.encode_new(new_job_id)?;
        loop {
            let current = self.tree.get(fingerprint.as_str()).map_err(db_err)?;
            if let Some(bytes) = &current {
                let holder = decode(bytes)?;
                if holder.job_id != expected_job_id {
                    return Err(IdempotencyError::AlreadyExists(holder.job_id));
                }
            }

            match self
                .tree
                .compare_and_swap(fingerprint.as_str(), current, Some(new_value.clone()))
                .map_err(db_err)?
            {
                Ok(()) => return Ok(()),
                Err(_) => continue,
            }
        }
    }

    async fn release(
        &self,
        fingerprint: &RequestFingerprint,
        job_id: &str,
    ) -> Result<bool, IdempotencyError> {
        loop {
            let Some(current) = self.tree.get(fingerprint.as_str()).map_err(db_err)? else {
                return Ok(false);
            };
            if decode(&current)?.job_id != job_id {
                return Ok(false);
            }

            match self
                .tree
                .compare_and_swap(fingerprint.as_str(), Some(current), None as Option<IVec>)
                .map_err(db_err)?
            {
                Ok(()) => return Ok(true),
                Err(_) => continue,
            }
        }
    }

    async fn expired_entries(
        &self,
        limit: usize,
    ) -> Result<Vec<(RequestFingerprint, String)>, IdempotencyError> {
        let now = now_ms();
        let mut expired = Vec::new();

        for item in self.tree.iter() {
            if expired.len() >= limit {
                break;
            }
            let (key, value) = item.map_err(db_err)?;
            let entry = match decode(&value) {
                Ok(entry) => entry,
                Err(e) => {
                    // 无法解析的条目没有持有者可以比较，直接删除
                    tracing::warn!(error = %e, "Dropping undecodable idempotency entry");
                    self.tree
                        .compare_and_swap(&key, Some(&value), None as Option<IVec>)
                        .map_err(db_err)?
                        .ok();
                    continue;
                }
            };
            if entry.is_live(now) {
                continue;
            }
            let fingerprint = RequestFingerprint::from_string(
                String::from_utf8_lossy(&key).into_owned(),
            );
            expired.push((fingerprint, entry.job_id));
        }

        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store(ttl: Duration) -> SledIdempotencyStore {
        let db = sled::Config::new().temporary(true).open().unwrap();
        SledIdempotencyStore::from_db(&db, ttl).unwrap()
    }

    fn fp(value: &str) -> RequestFingerprint {
        RequestFingerprint::from_string(value.to_string())
    }

    #[tokio::test]
    async fn test_reserve_then_conflict() {
        let store = store(Duration::from_secs(60));
        store.reserve(&fp("a"), "job-1").await.unwrap();

        match store.reserve(&fp("a"), "job-2").await {
            Err(IdempotencyError::AlreadyExists(holder)) => assert_eq!(holder, "job-1"),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(store.lookup(&fp("a")).await.unwrap().as_deref(), Some("job-1"));
        assert!(store.lookup(&fp("b")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_reserve_single_winner() {
        let store = Arc::new(store(Duration::from_secs(60)));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.reserve(&fp("same"), &format!("job-{}", i)).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_reported_not_overwritten() {
        let store = store(Duration::from_millis(20));
        store.reserve(&fp("a"), "job-1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(store.lookup(&fp("a")).await.unwrap().is_none());
        match store.reserve(&fp("a"), "job-2").await {
            Err(IdempotencyError::Expired(holder)) => assert_eq!(holder, "job-1"),
            other => panic!("unexpected: {:?}", other),
        }

        // 调用方确认原 job 已结束后接管
        store.replace(&fp("a"), "job-1", "job-2").await.unwrap();
        assert_eq!(store.lookup(&fp("a")).await.unwrap().as_deref(), Some("job-2"));
    }

    #[tokio::test]
    async fn test_replace_with_same_holder_renews() {
        let store = store(Duration::from_millis(50));
        store.reserve(&fp("a"), "job-1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(store.lookup(&fp("a")).await.unwrap().is_none());

        store.replace(&fp("a"), "job-1", "job-1").await.unwrap();
        assert_eq!(store.lookup(&fp("a")).await.unwrap().as_deref(), Some("job-1"));
        assert!(store.expired_entries(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_requires_expected_holder() {
        let store = store(Duration::from_secs(60));
        store.reserve(&fp("a"), "failed-job").await.unwrap();

        store.replace(&fp("a"), "failed-job", "retry-1").await.unwrap();
        match store.replace(&fp("a"), "failed-job", "retry-2").await {
            Err(IdempotencyError::AlreadyExists(holder)) => assert_eq!(holder, "retry-1"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_release_only_by_holder() {
        let store = store(Duration::from_secs(60));
        store.reserve(&fp("a"), "job-1").await.unwrap();

        assert!(!store.release(&fp("a"), "job-2").await.unwrap());
        assert!(store.release(&fp("a"), "job-1").await.unwrap());
        assert!(!store.release(&fp("a"), "job-1").await.unwrap());
        store.reserve(&fp("a"), "job-3").await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_entries_listed_until_released() {
        let store = store(Duration::from_millis(20));
        store.reserve(&fp("a"), "job-1").await.unwrap();
        store.reserve(&fp("b"), "job-2").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let mut expired = store.expired_entries(10).await.unwrap();
        expired.sort_by(|x, y| x.1.cmp(&y.1));
        assert_eq!(expired.len(), 2);
        assert_eq!(expired[0].0.as_str(), "a");
        assert_eq!(expired[0].1, "job-1");
        assert_eq!(store.expired_entries(1).await.unwrap().len(), 1);

        assert!(store.release(&fp("a"), "job-1").await.unwrap());
        assert_eq!(store.expired_entries(10).await.unwrap().len(), 1);
        store.reserve(&fp("a"), "job-3").await.unwrap();
    }
}
