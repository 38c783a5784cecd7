use std::sync::Arc;
use std::time::Duration;

use crate::models::events::StatusEvent;
use crate::models::identity::Identity;
use crate::models::job::Job;
use crate::services::backend::{BackendClient, BackendError};
use crate::services::reconcile;

/// The job history list. Owns the displayed collection; push events only
/// propose patches to it.
#[derive(Debug, Clone)]
pub struct HistoryView {
    jobs: Arc<[Job]>,
}

impl Default for HistoryView {
    fn default() -> Self {
        Self::with_jobs(Vec::new())
    }
}

impl HistoryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: Vec<Job>) -> Self {
        Self { jobs: jobs.into() }
    }

    /// Current snapshot. Cheap to clone and never mutated after hand-out.
    pub fn jobs(&self) -> &Arc<[Job]> {
        &self.jobs
    }

    pub fn get(&self, job_id: &str) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == job_id)
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Replace the collection with the backend's list. On failure the
    /// current collection is kept.
    pub async fn refresh(
        &mut self,
        backend: &BackendClient,
        identity: &Identity,
    ) -> Result<usize, BackendError> {
        let jobs = backend.list_uploads(identity).await?;
        let count = jobs.len();
        self.jobs = jobs.into();
        Ok(count)
    }

    /// [`HistoryView::refresh`] with up to `attempts` tries and a `pause`
    /// between them. Returns the last error once every try failed.
    pub async fn refresh_with_retry(
        &mut self,
        backend: &BackendClient,
        identity: &Identity,
        attempts: u32,
        pause: Duration,
    ) -> Result<usize, BackendError> {
        let mut attempt = 1;
        loop {
            match self.refresh(backend, identity).await {
                Ok(count) => return Ok(count),
                Err(e) if attempt < attempts => {
                    tracing::warn!(user_id = %identity, attempt, error = %e, "Failed to load job history, retrying");
                    tokio::time::sleep(pause).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Apply a push event. Returns whether the collection changed.
    pub fn apply(&mut self, event: &StatusEvent) -> bool {
        let next = reconcile::apply_event(event, &self.jobs);
        let changed = !Arc::ptr_eq(&next, &self.jobs);
        self.jobs = next;
        changed
    }

    /// Delete a job on the backend and, once it confirms, drop the row.
    pub async fn delete(
        &mut self,
        backend: &BackendClient,
        identity: &Identity,
        job_id: &str,
    ) -> Result<String, BackendError> {
        let message = backend.delete(identity, job_id).await?;
        self.jobs = reconcile::remove_job(&self.jobs, job_id);
        Ok(message)
    }
}
