use crate::models::events::StatusEvent;
use crate::models::identity::Identity;
use crate::models::job::{Job, Timestamp};
use crate::models::responses::JobCreated;
use crate::services::backend::{BackendClient, BackendError};
use crate::services::upload::{MediaFile, UploadError};

/// What the user submitted, kept until the job is located on the backend.
#[derive(Debug, Clone)]
struct PendingUpload {
    file_name: String,
    started_at: Timestamp,
    accepted: bool,
}

/// Single-job analysis screen: one upload, its progress, and its result.
///
/// The view only follows a job it located on the backend after the upload
/// was accepted. Push events never introduce a job here.
#[derive(Debug, Clone, Default)]
pub struct AnalysisView {
    pending: Option<PendingUpload>,
    job: Option<Job>,
    progress: u8,
    message: Option<String>,
    error: bool,
}

impl AnalysisView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking an upload of `file`; shows the analyzing spinner.
    pub fn begin(&mut self, file: &MediaFile) {
        *self = Self {
            pending: Some(PendingUpload {
                file_name: file.file_name().to_string(),
                started_at: Timestamp::now(),
                accepted: false,
            }),
            ..Self::default()
        };
    }

    pub fn record_progress(&mut self, percent: u8) {
        self.progress = self.progress.max(percent.min(100));
    }

    /// Record the submitter's outcome as the status message.
    pub fn finish_upload(&mut self, outcome: &Result<JobCreated, UploadError>) {
        match outcome {
            Ok(created) => {
                self.message = Some(created.message.clone());
                self.error = false;
                if let Some(pending) = self.pending.as_mut() {
                    pending.accepted = true;
                }
            }
            Err(e) => {
                self.message = Some(e.user_message());
                self.error = true;
                self.pending = None;
            }
        }
    }

    /// Find the accepted upload's job in the user's history.
    ///
    /// The upload response carries no job id. Returns whether a job is
    /// tracked afterwards; before acceptance nothing is fetched.
    pub async fn locate(
        &mut self,
        backend: &BackendClient,
        identity: &Identity,
    ) -> Result<bool, BackendError> {
        if self.job.is_some() {
            return Ok(true);
        }
        if !self.pending.as_ref().is_some_and(|p| p.accepted) {
            return Ok(false);
        }

        let jobs = backend.list_uploads(identity).await?;
        Ok(self.adopt(jobs))
    }

    /// Pick the accepted upload's job out of a history listing.
    ///
    /// Candidates share the file name and were created no earlier than
    /// [`AnalysisView::begin`]; unfinished jobs win over finished ones, then
    /// the newest wins.
    pub fn adopt(&mut self, jobs: impl IntoIterator<Item = Job>) -> bool {
        if self.job.is_some() {
            return true;
        }
        let Some(pending) = self.pending.as_ref().filter(|p| p.accepted) else {
            return false;
        };

        let found = jobs
            .into_iter()
            .filter(|job| job.file_name == pending.file_name && job.uploaded_on >= pending.started_at)
            .max_by_key(|job| (!job.status.is_terminal(), job.uploaded_on));

        match found {
            Some(job) => {
                tracing::debug!(job_id = %job.id, status = %job.status, "Analysis view located job");
                self.job = Some(job);
                true
            }
            None => {
                tracing::warn!(file_name = %pending.file_name, "Accepted upload not found in history");
                false
            }
        }
    }

    /// Apply a push event for the tracked job. Returns whether the view
    /// changed; events for any other id are ignored.
    pub fn apply(&mut self, event: &StatusEvent) -> bool {
        let Some(patch) = event.patch() else {
            return false;
        };
        let Some(job) = self.job.as_mut().filter(|job| job.id == patch.id) else {
            return false;
        };

        let merged = job.merged(patch);
        if merged == *job {
            return false;
        }
        tracing::debug!(job_id = %merged.id, status = %merged.status, "Analysis view updated");
        *job = merged;
        true
    }

    /// Forget the file and result ("Remove").
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    /// Spinner state: an upload is in flight or its job has not reached
    /// `completed` or `error` yet.
    pub fn is_analyzing(&self) -> bool {
        self.pending.is_some()
            && !self.error
            && !self.job.as_ref().is_some_and(|job| job.status.is_terminal())
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_error(&self) -> bool {
        self.error
    }
}
