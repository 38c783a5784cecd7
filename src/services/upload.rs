use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use futures::TryStreamExt;
use garde::Validate;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use tokio_util::io::ReaderStream;

use crate::config::Endpoints;
use crate::models::identity::Identity;
use crate::models::job::FileType;
use crate::models::responses::{ApiStatus, JobCreated, UploadResponse};
use crate::services::backend::{read_json, TransportError};

const CHUNK_SIZE: usize = 64 * 1024;

/// Receives upload progress as a whole percentage in `0..=100`.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, percent: u8);
}

impl<F> ProgressSink for F
where
    F: Fn(u8) + Send + Sync,
{
    fn emit(&self, percent: u8) {
        self(percent)
    }
}

/// Publishes the latest percentage on a watch channel.
pub struct WatchProgress(pub tokio::sync::watch::Sender<u8>);

impl ProgressSink for WatchProgress {
    fn emit(&self, percent: u8) {
        self.0.send_replace(percent);
    }
}

/// Discards progress.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _percent: u8) {}
}

/// Turns byte counts into non-decreasing percentages.
struct ProgressTracker {
    sink: Arc<dyn ProgressSink>,
    total: u64,
    sent: AtomicU64,
    last: AtomicU8,
}

impl ProgressTracker {
    fn new(sink: Arc<dyn ProgressSink>, total: u64) -> Self {
        Self {
            sink,
            total,
            sent: AtomicU64::new(0),
            last: AtomicU8::new(0),
        }
    }

    fn advance(&self, bytes: usize) {
        let sent = self.sent.fetch_add(bytes as u64, Ordering::Relaxed) + bytes as u64;
        self.report(percent(sent, self.total));
    }

    /// Called after the backend accepted the upload.
    fn complete(&self) {
        self.report(100);
    }

    fn report(&self, percent: u8) {
        let previous = self.last.fetch_max(percent, Ordering::AcqRel);
        if percent > previous {
            self.sink.emit(percent);
        }
    }
}

/// `sent / total` as a percentage rounded half up, clamped to 100.
fn percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let sent = u128::from(sent.min(total));
    let total = u128::from(total);
    ((sent * 200 + total) / (total * 2)) as u8
}

/// A local media file selected for analysis.
#[derive(Debug, Clone, Validate)]
pub struct MediaFile {
    #[garde(skip)]
    path: PathBuf,

    #[garde(length(min = 1, max = 255))]
    file_name: String,

    #[garde(skip)]
    mime: String,

    #[garde(skip)]
    len: u64,
}

impl MediaFile {
    /// Stat the file and guess its content type from the extension.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|source| UploadError::Io { path: path.clone(), source })?;

        if !metadata.is_file() {
            return Err(UploadError::Io {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            });
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        let file = Self {
            path,
            file_name,
            mime,
            len: metadata.len(),
        };
        file.validate()?;

        if file.file_type() == FileType::Unknown {
            tracing::warn!(file_name = %file.file_name, mime = %file.mime, "File does not look like an image or video");
        }

        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The class the backend will assign to this upload.
    pub fn file_type(&self) -> FileType {
        FileType::from_mime(&self.mime)
    }
}

/// Sends selected files to the backend's upload endpoint.
pub struct UploadSubmitter {
    http: Client,
    endpoints: Endpoints,
}

impl UploadSubmitter {
    pub fn new(http: Client, endpoints: Endpoints) -> Self {
        Self { http, endpoints }
    }

    /// Upload `file` for `identity`, reporting progress to `progress`.
    ///
    /// Does not touch any displayed job collection; the job appears through
    /// the push channel or the next history fetch. Failures come back as
    /// [`UploadError`] and are logged here.
    pub async fn submit(
        &self,
        file: &MediaFile,
        identity: Option<&Identity>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<JobCreated, UploadError> {
        let result = self.try_submit(file, identity, progress).await;

        match &result {
            Ok(created) => {
                metrics::counter!("uploads_submitted_total").increment(1);
                tracing::info!(file_name = %file.file_name, message = %created.message, "Upload accepted");
            }
            Err(e) => {
                metrics::counter!("uploads_failed_total").increment(1);
                tracing::warn!(file_name = %file.file_name, error = %e, "Upload failed");
            }
        }

        result
    }

    async fn try_submit(
        &self,
        file: &MediaFile,
        identity: Option<&Identity>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<JobCreated, UploadError> {
        let identity = identity.ok_or(UploadError::NotAuthenticated)?;

        let handle = tokio::fs::File::open(&file.path)
            .await
            .map_err(|source| UploadError::Io { path: file.path.clone(), source })?;

        let tracker = Arc::new(ProgressTracker::new(progress, file.len));
        let counted = Arc::clone(&tracker);
        let stream = ReaderStream::with_capacity(handle, CHUNK_SIZE)
            .inspect_ok(move |chunk| counted.advance(chunk.len()));

        let part = Part::stream_with_length(Body::wrap_stream(stream), file.len)
            .file_name(file.file_name.clone())
            .mime_str(&file.mime)
            .map_err(TransportError::Network)?;
        let form = Form::new()
            .part("file", part)
            .text("userId", identity.user_id().to_string());

        tracing::info!(
            file_name = %file.file_name,
            bytes = file.len,
            user_id = %identity,
            "Uploading media for analysis"
        );

        let response = self
            .http
            .post(self.endpoints.upload())
            .multipart(form)
            .send()
            .await
            .map_err(TransportError::Network)?;

        let body: UploadResponse = read_json(response).await?;
        match body.status {
            ApiStatus::Success => {
                tracker.complete();
                Ok(JobCreated {
                    message: body.message,
                    file_name: body.filename,
                })
            }
            ApiStatus::Error => Err(UploadError::Rejected(body.message)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No authenticated user")]
    NotAuthenticated,

    #[error("Cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid media file: {0}")]
    Invalid(#[from] garde::Report),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The backend answered `{"status": "error", "message": ...}`.
    #[error("Upload rejected: {0}")]
    Rejected(String),
}

impl UploadError {
    /// Text to show the user in place of the upload result.
    pub fn user_message(&self) -> String {
        match self {
            UploadError::NotAuthenticated => "Sign in to analyze media.".to_string(),
            UploadError::Io { path, .. } => format!("Could not read {}.", path.display()),
            UploadError::Invalid(_) => "Unsupported file name.".to_string(),
            UploadError::Transport(_) => "Upload failed!".to_string(),
            UploadError::Rejected(message) => message.clone(),
        }
    }
}
