//! In-process fake of the detection backend for integration testing

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use deepdetect_client::{app_state::AppState, config::AppConfig};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use url::Url;

/// Sent through a user's channel to make the server close the socket.
pub const CLOSE_SIGNAL: &str = "__close__";

/// What the fake backend saw in an upload request.
#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub user_id: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: usize,
}

#[derive(Default)]
struct Inner {
    uploads: Mutex<HashMap<String, Vec<Value>>>,
    received: Mutex<Vec<ReceivedUpload>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    upload_message: Mutex<String>,
    fail_uploads: AtomicBool,
    connections: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<Inner>,
}

/// A running fake backend bound to a random local port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub backend: FakeBackend,
}

impl TestServer {
    pub async fn start() -> TestServer {
        let backend = FakeBackend::default();
        *backend.inner.upload_message.lock().unwrap() = "Uploaded".to_string();

        let app = Router::new()
            .route("/upload", post(upload))
            .route("/user-uploads/{user_id}", get(user_uploads))
            .route("/file/{file_id}/{user_id}", get(download).delete(delete))
            .route("/ws/{user_id}", get(push_channel))
            .layer(DefaultBodyLimit::max(16 * 1024 * 1024))
            .with_state(backend.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Listener has no address");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Test server error");
        });

        TestServer { addr, backend }
    }

    pub fn config(&self) -> AppConfig {
        let mut config = AppConfig::for_endpoints(
            Url::parse(&format!("http://{}", self.addr)).unwrap(),
            Url::parse(&format!("ws://{}/ws", self.addr)).unwrap(),
        );
        config.reconnect_initial_ms = 20;
        config.reconnect_max_ms = 100;
        config
    }

    pub fn state(&self) -> AppState {
        AppState::new(&self.config()).expect("Failed to build app state")
    }
}

impl FakeBackend {
    pub fn seed(&self, user_id: &str, record: Value) {
        self.inner
            .uploads
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default()
            .push(record);
    }

    pub fn records(&self, user_id: &str) -> Vec<Value> {
        self.inner
            .uploads
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn received(&self) -> Vec<ReceivedUpload> {
        self.inner.received.lock().unwrap().clone()
    }

    pub fn set_upload_message(&self, message: &str) {
        *self.inner.upload_message.lock().unwrap() = message.to_string();
    }

    pub fn fail_uploads(&self) {
        self.inner.fail_uploads.store(true, Ordering::SeqCst);
    }

    fn channel(&self, user_id: &str) -> broadcast::Sender<String> {
        self.inner
            .channels
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }

    /// Number of open push sockets for a user.
    pub fn subscribers(&self, user_id: &str) -> usize {
        self.channel(user_id).receiver_count()
    }

    /// Send a raw text frame to every socket of a user.
    pub fn push(&self, user_id: &str, frame: &str) {
        let _ = self.channel(user_id).send(frame.to_string());
    }

    /// Push sockets accepted so far, across all users.
    pub fn connections(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` push sockets have been accepted.
    pub async fn wait_for_connections(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.connections() < count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "Timed out waiting for {} connection(s), have {}",
                count,
                self.connections()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until a user has exactly `count` open push sockets.
    pub async fn wait_for_subscribers(&self, user_id: &str, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.subscribers(user_id) != count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "Timed out waiting for {} subscriber(s) on {}, have {}",
                count,
                user_id,
                self.subscribers(user_id)
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

async fn upload(State(backend): State<FakeBackend>, mut multipart: Multipart) -> Response {
    let mut user_id = None;
    let mut file = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map(|b| b.len()).unwrap_or(0);
                file = Some((file_name, content_type, bytes));
            }
            Some("userId") => user_id = field.text().await.ok(),
            _ => {}
        }
    }

    if backend.inner.fail_uploads.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upload storage unavailable").into_response();
    }

    let (Some(user_id), Some((file_name, content_type, bytes))) = (user_id, file) else {
        return Json(json!({"status": "error", "message": "file or userId is missing."}))
            .into_response();
    };
    if user_id.is_empty() {
        return Json(json!({"status": "error", "message": "file or userId is missing."}))
            .into_response();
    }
    if bytes == 0 {
        return Json(json!({"status": "error", "message": "Upload Failed. Empty file."}))
            .into_response();
    }

    let file_type = match content_type.as_deref() {
        Some(ct) if ct.starts_with("image/") => "image",
        Some(ct) if ct.starts_with("video/") => "video",
        _ => "unknown",
    };
    backend.seed(
        &user_id,
        json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "file_name": file_name,
            "file_location": format!("uploads/{user_id}/{file_name}"),
            "uploaded_on": chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            "file_type": file_type,
            "status": "analyzing",
            "confidence": null,
            "prediction": null,
            "result": null
        }),
    );
    backend.inner.received.lock().unwrap().push(ReceivedUpload {
        user_id,
        file_name: file_name.clone(),
        content_type,
        bytes,
    });

    let message = backend.inner.upload_message.lock().unwrap().clone();
    Json(json!({"status": "success", "message": message, "filename": file_name})).into_response()
}

async fn user_uploads(
    State(backend): State<FakeBackend>,
    Path(user_id): Path<String>,
) -> Json<Value> {
    Json(json!({
        "status": "success",
        "message": "User uploads fetched.",
        "uploads": backend.records(&user_id)
    }))
}

fn find_record(backend: &FakeBackend, user_id: &str, file_id: &str) -> Option<Value> {
    backend
        .records(user_id)
        .into_iter()
        .find(|record| record["id"] == file_id)
}

async fn download(
    State(backend): State<FakeBackend>,
    Path((file_id, user_id)): Path<(String, String)>,
) -> Response {
    match find_record(&backend, &user_id, &file_id) {
        Some(record) => {
            let file_name = record["file_name"].as_str().unwrap_or("file").to_string();
            (
                [
                    (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{file_name}\""),
                    ),
                ],
                format!("media for {file_id}"),
            )
                .into_response()
        }
        None => Json(json!({
            "status": "error",
            "message": "Download Failed. 'NoneType' object is not subscriptable"
        }))
        .into_response(),
    }
}

async fn delete(
    State(backend): State<FakeBackend>,
    Path((file_id, user_id)): Path<(String, String)>,
) -> Json<Value> {
    let mut uploads = backend.inner.uploads.lock().unwrap();
    let records = uploads.entry(user_id).or_default();
    let before = records.len();
    records.retain(|record| record["id"] != file_id.as_str());

    if records.len() < before {
        Json(json!({"status": "success", "message": "Delete Success."}))
    } else {
        Json(json!({
            "status": "error",
            "message": "Delete Failed. 'NoneType' object is not subscriptable"
        }))
    }
}

async fn push_channel(
    ws: WebSocketUpgrade,
    State(backend): State<FakeBackend>,
    Path(user_id): Path<String>,
) -> Response {
    let frames = backend.channel(&user_id).subscribe();
    backend.inner.connections.fetch_add(1, Ordering::SeqCst);
    ws.on_upgrade(move |socket| forward(socket, frames))
}

async fn forward(mut socket: WebSocket, mut frames: broadcast::Receiver<String>) {
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(text) if text == CLOSE_SIGNAL => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
                Ok(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
