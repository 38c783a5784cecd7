use serde::Deserialize;

use crate::models::job::JobPatch;

/// Event tag of the only push frames the client acts on.
pub const UPDATE_STATUS: &str = "update_status";

/// A push-channel message, validated at the socket boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    /// `{"event": "update_status", "data": {...}}`
    UpdateStatus(JobPatch),
    /// Any other well-formed frame; carries the tag for logging only.
    Other { event: String },
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl StatusEvent {
    /// Parse one text frame.
    pub fn parse(text: &str) -> Result<Self, StreamError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(StreamError::Malformed)?;

        if envelope.event != UPDATE_STATUS {
            return Ok(StatusEvent::Other {
                event: envelope.event,
            });
        }

        serde_json::from_value(envelope.data)
            .map(StatusEvent::UpdateStatus)
            .map_err(|source| StreamError::InvalidPayload {
                event: envelope.event,
                source,
            })
    }

    /// The job patch, if this event proposes one.
    pub fn patch(&self) -> Option<&JobPatch> {
        match self {
            StatusEvent::UpdateStatus(patch) => Some(patch),
            StatusEvent::Other { .. } => None,
        }
    }
}

impl From<JobPatch> for StatusEvent {
    fn from(patch: JobPatch) -> Self {
        StatusEvent::UpdateStatus(patch)
    }
}

/// Push-channel failures. Absorbed by the subscriber: logged, never surfaced.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Push frame is not a valid event envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Push event '{event}' has an unusable payload: {source}")]
    InvalidPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unexpected {0} frame on push channel")]
    UnexpectedFrame(&'static str),

    #[error("Push channel connection failed: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),
}
