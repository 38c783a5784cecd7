use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::config::Endpoints;
use crate::models::identity::Identity;
use crate::models::job::Job;
use crate::models::responses::{ApiResponse, ApiStatus, DownloadedFile, UploadsResponse};

/// Client for the detection backend's job history endpoints.
pub struct BackendClient {
    http: Client,
    endpoints: Endpoints,
}

impl BackendClient {
    pub fn new(http: Client, endpoints: Endpoints) -> Self {
        Self { http, endpoints }
    }

    /// Fetch every job the backend holds for this user.
    ///
    /// Records that do not parse as a job are skipped with a warning.
    pub async fn list_uploads(&self, identity: &Identity) -> Result<Vec<Job>, BackendError> {
        let response = self
            .http
            .get(self.endpoints.user_uploads(identity))
            .send()
            .await
            .map_err(TransportError::Network)?;

        let body: UploadsResponse = read_json(response).await?;
        if body.status == ApiStatus::Error {
            return Err(BackendError::Rejected(body.message));
        }

        let mut jobs = Vec::new();
        for record in body.uploads.unwrap_or_default() {
            match serde_json::from_value::<Job>(record) {
                Ok(job) => jobs.push(job),
                Err(e) => tracing::warn!(user_id = %identity, error = %e, "Skipping unreadable upload record"),
            }
        }

        tracing::debug!(user_id = %identity, count = jobs.len(), "Fetched upload history");
        Ok(jobs)
    }

    /// Download the original media for a job.
    ///
    /// The backend answers with the file itself, or with a JSON error
    /// envelope (still HTTP 200) when the file is gone.
    pub async fn download(
        &self,
        identity: &Identity,
        job_id: &str,
    ) -> Result<DownloadedFile, BackendError> {
        let response = self
            .http
            .get(self.endpoints.file(job_id, identity))
            .send()
            .await
            .map_err(TransportError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::from_response(response).await.into());
        }

        let content_type = header_str(&response, CONTENT_TYPE);
        let file_name = header_str(&response, CONTENT_DISPOSITION)
            .as_deref()
            .and_then(disposition_filename);
        let bytes = response.bytes().await.map_err(TransportError::Network)?;

        let is_json = content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("application/json"));
        if is_json {
            if let Ok(envelope) = serde_json::from_slice::<ApiResponse>(&bytes) {
                if envelope.status == ApiStatus::Error {
                    return Err(BackendError::Rejected(envelope.message));
                }
            }
        }

        tracing::info!(job_id = %job_id, bytes = bytes.len(), "Downloaded job media");
        Ok(DownloadedFile {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        })
    }

    /// Delete a job and its media. Returns the backend's message on success;
    /// only then may the caller drop the job from its collection.
    pub async fn delete(&self, identity: &Identity, job_id: &str) -> Result<String, BackendError> {
        let response = self
            .http
            .delete(self.endpoints.file(job_id, identity))
            .send()
            .await
            .map_err(TransportError::Network)?;

        let body: ApiResponse = read_json(response).await?;
        match body.status {
            ApiStatus::Success => {
                tracing::info!(job_id = %job_id, user_id = %identity, "Deleted job");
                Ok(body.message)
            }
            ApiStatus::Error => Err(BackendError::Rejected(body.message)),
        }
    }
}

/// Decode a 2xx JSON body, mapping every other outcome to a transport error.
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
    if !response.status().is_success() {
        return Err(TransportError::from_response(response).await);
    }
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(TransportError::Malformed)
}

fn header_str(response: &Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Extract `filename="..."` from a Content-Disposition header.
fn disposition_filename(value: &str) -> Option<String> {
    value
        .split(';')
        .map(str::trim)
        .find_map(|param| param.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Backend response was not understood: {0}")]
    Malformed(#[source] serde_json::Error),
}

impl TransportError {
    pub async fn from_response(response: Response) -> TransportError {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read response text".to_string());
        TransportError::Status { status, body }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The backend answered `{"status": "error", "message": ...}`.
    #[error("{0}")]
    Rejected(String),
}
