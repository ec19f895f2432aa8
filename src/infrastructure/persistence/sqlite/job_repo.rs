//! SQLite Job Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::DbPool;
use crate::application::ports::{JobRepositoryPort, RepositoryError};
use crate::domain::job::{
    Job, JobStatus, Priority, ProviderAttempt, RequestFingerprint, SynthesisRequest, VoiceOptions,
};

const JOB_COLUMNS: &str = "id, fingerprint, status, text, provider_preference, voice_options, priority, attempts, result_url, audio_key, provider, duration_ms, error, created_at, updated_at";

/// SQLite Job Repository
pub struct SqliteJobRepository {
    pool: DbPool,
}

impl SqliteJobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct JobRow {
    id: String,
    fingerprint: String,
    status: String,
    text: String,
    provider_preference: String,
    voice_options: String,
    priority: String,
    attempts: String,
    result_url: Option<String>,
    audio_key: Option<String>,
    provider: Option<String>,
    duration_ms: Option<i64>,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

fn serialization(e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::SerializationError(e.to_string())
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(serialization)
}

impl TryFrom<JobRow> for Job {
    type Error = RepositoryError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = JobStatus::from_str(&row.status)
            .ok_or_else(|| serialization(format!("unknown job status '{}'", row.status)))?;
        let provider_preference: Vec<String> =
            serde_json::from_str(&row.provider_preference).map_err(serialization)?;
        let voice_options: VoiceOptions =
            serde_json::from_str(&row.voice_options).map_err(serialization)?;
        let attempts: Vec<ProviderAttempt> =
            serde_json::from_str(&row.attempts).map_err(serialization)?;

        Ok(Job {
            id: row.id,
            fingerprint: RequestFingerprint::from_string(row.fingerprint),
            request: SynthesisRequest {
                text: row.text,
                provider_preference,
                voice_options,
                priority: Priority::from_str(&row.priority).unwrap_or_default(),
            },
            status,
            attempts,
            result_url: row.result_url,
            audio_key: row.audio_key,
            provider: row.provider,
            duration_ms: row.duration_ms.map(|d| d as u64),
            error: row.error,
            created_at: parse_time(&row.created_at)?,
            updated_at: parse_time(&row.updated_at)?,
        })
    }
}

struct EncodedJob {
    provider_preference: String,
    voice_options: String,
    attempts: String,
}

fn encode(job: &Job) -> Result<EncodedJob, RepositoryError> {
    Ok(EncodedJob {
        provider_preference: serde_json::to_string(&job.request.provider_preference)
            .map_err(serialization)?,
        voice_options: serde_json::to_string(&job.request.voice_options).map_err(serialization)?,
        attempts: serde_json::to_string(&job.attempts).map_err(serialization)?,
    })
}

#[async_trait]
impl JobRepositoryPort for SqliteJobRepository {
    async fn insert(&self, job: &Job) -> Result<(), RepositoryError> {
        let encoded = encode(job)?;

        sqlx::query(
            r#"
            INSERT INTO jobs (id, fingerprint, status, text, provider_preference, voice_options, priority, attempts, result_url, audio_key, provider, duration_ms, error, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(job.fingerprint.as_str())
        .bind(job.status.as_str())
        .bind(&job.request.text)
        .bind(&encoded.provider_preference)
        .bind(&encoded.voice_options)
        .bind(job.request.priority.as_str())
        .bind(&encoded.attempts)
        .bind(&job.result_url)
        .bind(&job.audio_key)
        .bind(&job.provider)
        .bind(job.duration_ms.map(|d| d as i64))
        .bind(&job.error)
        .bind(job.created_at.to_rfc3339())
        .bind(job.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Duplicate(job.id.clone())
            }
            other => RepositoryError::DatabaseError(other.to_string()),
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Job>, RepositoryError> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        row.map(Job::try_from).transpose()
    }

    async fn update(&self, job: &Job) -> Result<bool, RepositoryError> {
        let encoded = encode(job)?;

        // 终态记录不再覆盖
        let result = sqlx::query(
            r#"
            UPDATE jobs SET
                status = ?,
                attempts = ?,
                result_url = ?,
                audio_key = ?,
                provider = ?,
                duration_ms = ?,
                error = ?,
                updated_at = ?
            WHERE id = ? AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(job.status.as_str())
        .bind(&encoded.attempts)
        .bind(&job.result_url)
        .bind(&job.audio_key)
        .bind(&job.provider)
        .bind(job.duration_ms.map(|d| d as i64))
        .bind(&job.error)
        .bind(job.updated_at.to_rfc3339())
        .bind(&job.id)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_by_status(&self) -> Result<Vec<(JobStatus, u64)>, RepositoryError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter_map(|(status, count)| {
                JobStatus::from_str(&status).map(|s| (s, count.max(0) as u64))
            })
            .collect())
    }
}
