//! Test fixtures: backend job records and local media files

use std::path::{Path, PathBuf};

use serde_json::{json, Value};

pub const USER_ID: &str = "kp_4f1c2a";

/// A job record as the backend stores it right after upload.
pub fn analyzing_record(id: &str, file_name: &str) -> Value {
    json!({
        "id": id,
        "file_name": file_name,
        "file_location": format!("uploads/{USER_ID}/{USER_ID}_20240501_120000.mp4"),
        "uploaded_on": "2024-05-01 12:00:00.123456",
        "file_type": "video",
        "status": "analyzing",
        "confidence": null,
        "prediction": null,
        "result": null
    })
}

/// A job record whose analysis has finished.
pub fn completed_record(id: &str, file_name: &str) -> Value {
    json!({
        "id": id,
        "file_name": file_name,
        "file_location": format!("uploads/{USER_ID}/{USER_ID}_20240430_090000.png"),
        "uploaded_on": "2024-04-30 09:00:00.000001",
        "file_type": "image",
        "status": "completed",
        "confidence": "97.12%",
        "prediction": "REAL",
        "result": "REAL",
        "analysis_completed_on": "2024-04-30 09:00:41.5"
    })
}

/// The frame the backend pushes when a prediction is ready.
pub fn update_status_frame(id: &str, prediction: &str, confidence: &str) -> String {
    json!({
        "event": "update_status",
        "data": {
            "status": "completed",
            "confidence": confidence,
            "prediction": prediction,
            "result": prediction,
            "analysis_completed_on": "2024-05-01 12:03:10.250000",
            "id": id,
            "userId": USER_ID
        }
    })
    .to_string()
}

/// Write a media file of `size` bytes.
pub fn media_file(dir: &Path, name: &str, size: usize) -> PathBuf {
    let path = dir.join(name);
    let bytes: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, bytes).expect("Failed to write media fixture");
    path
}
