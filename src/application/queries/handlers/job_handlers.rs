//! Job Query Handlers

use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::ports::{JobRepositoryPort, ObjectStorePort};
use crate::application::queries::GetJob;
use crate::domain::job::{Job, JobStatus};

/// GetJob Handler
pub struct GetJobHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
    object_store: Arc<dyn ObjectStorePort>,
}

impl GetJobHandler {
    pub fn new(job_repo: Arc<dyn JobRepositoryPort>, object_store: Arc<dyn ObjectStorePort>) -> Self {
        Self {
            job_repo,
            object_store,
        }
    }

    /// completed 的 job 每次查询都签发新的 URL
    pub async fn handle(&self, query: GetJob) -> Result<Job, ApplicationError> {
        let mut job = self
            .job_repo
            .find_by_id(&query.job_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Job", &query.job_id))?;

        if job.status == JobStatus::Completed {
            if let Some(key) = job.audio_key.as_deref() {
                job.result_url = Some(self.object_store.sign_url(key));
            }
        }

        Ok(job)
    }
}
