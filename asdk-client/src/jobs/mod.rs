//! Remote job model
//!
//! Avatar computations and exports are both "jobs": server-owned resources
//! with a self URL, a status and a progress percentage. The client only reads
//! snapshots of them; it never mutates one locally.

pub mod poller;

pub use poller::{poll_job, JobFetcher, PollOptions};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use tracing::warn;

/// Status of a remote job as reported by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Pending,
    Uploading,
    Queued,
    Computing,
    Completed,
    Failed,
    TimedOut,
    /// Status string this client does not know
    Unknown(String),
}

/// What the polling machine does after observing a status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Keep polling
    Continue,
    /// Stop, job succeeded
    Resolve,
    /// Stop, job failed
    Reject,
}

impl JobStatus {
    /// Transition the polling machine takes for this status
    ///
    /// Unknown statuses keep polling: the server will eventually move the job
    /// to `Timed Out` on its own.
    pub fn transition(&self) -> Transition {
        match self {
            JobStatus::Pending
            | JobStatus::Uploading
            | JobStatus::Queued
            | JobStatus::Computing
            | JobStatus::Unknown(_) => Transition::Continue,
            JobStatus::Completed => Transition::Resolve,
            JobStatus::Failed | JobStatus::TimedOut => Transition::Reject,
        }
    }

    /// Completed, Failed or TimedOut
    pub fn is_terminal(&self) -> bool {
        self.transition() != Transition::Continue
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Uploading => "Uploading",
            JobStatus::Queued => "Queued",
            JobStatus::Computing => "Computing",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
            JobStatus::TimedOut => "Timed Out",
            JobStatus::Unknown(raw) => raw,
        }
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Pending" => JobStatus::Pending,
            "Uploading" => JobStatus::Uploading,
            "Queued" => JobStatus::Queued,
            "Computing" => JobStatus::Computing,
            "Completed" => JobStatus::Completed,
            "Failed" => JobStatus::Failed,
            "Timed Out" | "TimedOut" => JobStatus::TimedOut,
            _ => JobStatus::Unknown(s),
        }
    }
}

impl From<&str> for JobStatus {
    fn from(s: &str) -> Self {
        JobStatus::from(s.to_string())
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Unknown(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything the polling machine can refresh and evaluate
pub trait RemoteJob: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Job kind used in logs and events
    const KIND: &'static str;

    /// Self URL the current snapshot is fetched from
    fn url(&self) -> &str;

    fn status(&self) -> &JobStatus;

    /// Progress percentage (0-100)
    fn progress(&self) -> u8;
}

/// Avatar computation job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarJob {
    /// Self URL
    pub url: String,
    /// Short identifier of the avatar
    #[serde(default)]
    pub code: Option<String>,
    pub status: JobStatus,
    #[serde(default, deserialize_with = "deserialize_progress")]
    pub progress: u8,
    /// URL listing this avatar's exports
    #[serde(default)]
    pub exports: Option<String>,
    /// Fields this client does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RemoteJob for AvatarJob {
    const KIND: &'static str = "avatar";

    fn url(&self) -> &str {
        &self.url
    }

    fn status(&self) -> &JobStatus {
        &self.status
    }

    fn progress(&self) -> u8 {
        self.progress
    }
}

/// Export job of an avatar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportJob {
    /// Self URL
    pub url: String,
    pub status: JobStatus,
    #[serde(default, deserialize_with = "deserialize_progress")]
    pub progress: u8,
    /// Creation time; orders the exports of one avatar
    #[serde(default, deserialize_with = "deserialize_created_on")]
    pub created_on: Option<CreatedOn>,
    /// Result files, populated once the export is completed
    #[serde(default)]
    pub files: Vec<ExportFile>,
    /// Fields this client does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RemoteJob for ExportJob {
    const KIND: &'static str = "export";

    fn url(&self) -> &str {
        &self.url
    }

    fn status(&self) -> &JobStatus {
        &self.status
    }

    fn progress(&self) -> u8 {
        self.progress
    }
}

/// Creation time exactly as the service sent it
///
/// Only used to order exports, so the value is never parsed as a date.
/// Numbers compare numerically, strings lexically (ISO 8601 text sorts
/// chronologically that way), and numbers sort before strings.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CreatedOn {
    Number(f64),
    Text(String),
}

impl Ord for CreatedOn {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (CreatedOn::Number(a), CreatedOn::Number(b)) => a.total_cmp(b),
            (CreatedOn::Text(a), CreatedOn::Text(b)) => a.cmp(b),
            (CreatedOn::Number(_), CreatedOn::Text(_)) => Ordering::Less,
            (CreatedOn::Text(_), CreatedOn::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for CreatedOn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for CreatedOn {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CreatedOn {}

/// One downloadable result of an export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFile {
    /// Name of the exported item ("avatar", a haircut name, ...)
    pub identity: String,
    /// Export category (haircuts, outfits, ...); `None` for the avatar itself
    #[serde(default)]
    pub category: Option<String>,
    /// URL of the zip archive
    pub file: String,
    /// URLs of standalone files (textures, previews)
    #[serde(default)]
    pub static_files: Vec<String>,
}

/// Accept any JSON number (or null) and clamp it into 0..=100
fn deserialize_progress<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    let pct = raw.as_ref().and_then(Value::as_f64).unwrap_or(0.0);
    Ok(pct.round().clamp(0.0, 100.0) as u8)
}

/// Keep numbers and strings; anything else orders as "no timestamp"
fn deserialize_created_on<'de, D>(deserializer: D) -> Result<Option<CreatedOn>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64().map(CreatedOn::Number),
        Some(Value::String(s)) => Some(CreatedOn::Text(s)),
        Some(other) => {
            warn!(value = %other, "Ignoring unsupported export creation time");
            None
        }
    })
}
