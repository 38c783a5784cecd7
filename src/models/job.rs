use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use strum::{Display, EnumString};

/// Status of an analysis job as observed by the client.
///
/// The backend sends free text; parsing is case-insensitive and `failed`
/// is read as `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum JobStatus {
    Queued,
    Analyzing,
    Completed,
    #[strum(to_string = "error", serialize = "failed")]
    Error,
}

impl JobStatus {
    /// `completed` and `error` have no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// Whether an observed move from `self` to `next` is allowed.
    ///
    /// `queued -> analyzing -> {completed | error}`; `queued` may skip straight
    /// to a later state when the backend fast-forwards before the first event.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (current, next) if current == next => true,
            (Queued, Analyzing | Completed | Error) => true,
            (Analyzing, Completed | Error) => true,
            _ => false,
        }
    }
}

/// Verdict of the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Prediction {
    Real,
    Fake,
}

/// Media class the backend derives from the uploaded part's content type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FileType {
    Image,
    Video,
    #[default]
    Unknown,
}

impl FileType {
    /// Classify a MIME type the same way the backend does.
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            FileType::Image
        } else if mime.starts_with("video/") {
            FileType::Video
        } else {
            FileType::Unknown
        }
    }
}

// Status and prediction travel as plain strings on the wire.
macro_rules! string_serde {
    ($ty:ty, $expecting:literal) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.trim()
                    .parse()
                    .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(&raw), &$expecting))
            }
        }
    };
}

string_serde!(JobStatus, "one of queued, analyzing, completed, error");
string_serde!(Prediction, "real or fake");

impl Serialize for FileType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FileType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.trim().parse().unwrap_or_default())
    }
}

/// Detector confidence exactly as the backend reported it (e.g. `"93.21%"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Confidence(String);

impl Confidence {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric score with any trailing `%` stripped.
    pub fn value(&self) -> Option<f64> {
        self.0.trim().trim_end_matches('%').trim().parse().ok()
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Confidence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Confidence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(f64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => Confidence(text),
            Raw::Number(number) => Confidence(number.to_string()),
        })
    }
}

/// Backend timestamp: a naive local datetime (`2024-05-01 12:34:56.789012`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NaiveDateTime);

const WIRE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

impl Timestamp {
    pub fn new(datetime: NaiveDateTime) -> Self {
        Self(datetime)
    }

    pub fn now() -> Self {
        Self(chrono::Local::now().naive_local())
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        NaiveDateTime::parse_from_str(s, WIRE_FORMAT)
            .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.naive_utc()))
            .map(Timestamp)
    }
}

/// Displays to whole seconds.
impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S"))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0.format("%Y-%m-%d %H:%M:%S%.6f"))
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// One submitted media analysis request (the backend's "upload" record).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub file_name: String,
    #[serde(default)]
    pub file_type: FileType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_location: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub prediction: Option<Prediction>,
    #[serde(default)]
    pub confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub uploaded_on: Timestamp,
    #[serde(default)]
    pub analysis_completed_on: Option<Timestamp>,
}

impl Job {
    /// A freshly created job with no analysis data yet.
    pub fn queued(
        id: impl Into<String>,
        file_name: impl Into<String>,
        file_type: FileType,
        uploaded_on: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            file_name: file_name.into(),
            file_type,
            file_location: None,
            status: JobStatus::Queued,
            prediction: None,
            confidence: None,
            result: None,
            uploaded_on,
            analysis_completed_on: None,
        }
    }

    /// Shallow-merge a status patch into a copy of this job.
    ///
    /// Fields present in the patch overwrite, absent ones are kept. Status
    /// follows [`JobStatus::can_transition_to`]. Analysis results are only
    /// taken once the merged status is `completed`, and the completion time
    /// only once it is terminal, so they are never set early or cleared.
    pub fn merged(&self, patch: &JobPatch) -> Job {
        let mut next = self.clone();

        if let Some(status) = patch.status {
            if self.status.can_transition_to(status) {
                next.status = status;
            } else {
                tracing::debug!(
                    job_id = %self.id,
                    from = %self.status,
                    to = %status,
                    "Ignoring status transition out of observed state"
                );
            }
        }

        if next.status == JobStatus::Completed {
            if let Some(prediction) = patch.prediction {
                next.prediction = Some(prediction);
            }
            if let Some(confidence) = &patch.confidence {
                next.confidence = Some(confidence.clone());
            }
            if let Some(result) = &patch.result {
                next.result = Some(result.clone());
            }
        }

        if next.status.is_terminal() {
            if let Some(completed_on) = patch.analysis_completed_on {
                next.analysis_completed_on = Some(completed_on);
            }
        }

        next
    }
}

/// Partial job state carried by an `update_status` push event.
///
/// `null` and a missing key mean the same thing: leave the field alone.
/// Creation-time fields (`file_name`, `file_type`, `uploaded_on`) are
/// immutable and therefore not part of a patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPatch {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<Prediction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_completed_on: Option<Timestamp>,
}

impl JobPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}
