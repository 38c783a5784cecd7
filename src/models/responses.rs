use serde::Deserialize;

/// Outcome tag every backend JSON envelope carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    Success,
    Error,
}

/// `{status, message}` as returned by delete and by error paths.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    pub status: ApiStatus,
    #[serde(default)]
    pub message: String,
}

/// Response body of `POST /upload`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub status: ApiStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub filename: Option<String>,
}

/// Response body of `GET /user-uploads/{userId}`.
///
/// Entries stay untyped here so one bad record does not hide the rest.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadsResponse {
    pub status: ApiStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub uploads: Option<Vec<serde_json::Value>>,
}

/// Successful upload. The backend assigns the job id and announces the job
/// over the push channel; the client never fabricates one.
#[derive(Debug, Clone, PartialEq)]
pub struct JobCreated {
    pub message: String,
    pub file_name: Option<String>,
}

/// A downloaded original media file.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}
