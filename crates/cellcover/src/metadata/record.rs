//! Job record types persisted in the metadata document.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Number of characters used for short job ids in actions and filenames.
pub const SHORT_ID_LEN: usize = 6;

/// Returns the first six characters of a job id.
pub fn short_id(job_id: &str) -> &str {
    match job_id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &job_id[..idx],
        None => job_id,
    }
}

/// Current time in the format used for record timestamps.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339()
}

// ─── JobStatus ──────────────────────────────────────────────────────────────

/// Lifecycle status of a job record.
///
/// Strings that are not part of the known vocabulary are carried as
/// [`JobStatus::Other`] so legacy documents load without loss.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Unknown,
    Pending,
    Submitted,
    SubmittedWebhook,
    OnQueue,
    Processing,
    Completed,
    CompletedNoUrl,
    Failed,
    FileMissing,
    RenameFailed,
    PollingFailed,
    SyncError,
    SourceTask,
    SourcePollFailed,
    SourceSyncError,
    Other(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Unknown => "unknown",
            JobStatus::Pending => "pending",
            JobStatus::Submitted => "submitted",
            JobStatus::SubmittedWebhook => "submitted_webhook",
            JobStatus::OnQueue => "on_queue",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::CompletedNoUrl => "completed_no_url",
            JobStatus::Failed => "failed",
            JobStatus::FileMissing => "file_missing",
            JobStatus::RenameFailed => "rename_failed",
            JobStatus::PollingFailed => "polling_failed",
            JobStatus::SyncError => "sync_error",
            JobStatus::SourceTask => "source_task",
            JobStatus::SourcePollFailed => "source_poll_failed",
            JobStatus::SourceSyncError => "source_sync_error",
            JobStatus::Other(s) => s,
        }
    }

    /// Parses a status name case-insensitively. The vendor's `SUCCESS`
    /// maps to [`JobStatus::Completed`].
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => JobStatus::Unknown,
            "pending" => JobStatus::Pending,
            "submitted" => JobStatus::Submitted,
            "submitted_webhook" => JobStatus::SubmittedWebhook,
            "on_queue" => JobStatus::OnQueue,
            "processing" => JobStatus::Processing,
            "completed" | "success" => JobStatus::Completed,
            "completed_no_url" => JobStatus::CompletedNoUrl,
            "failed" => JobStatus::Failed,
            "file_missing" => JobStatus::FileMissing,
            "rename_failed" => JobStatus::RenameFailed,
            "polling_failed" => JobStatus::PollingFailed,
            "sync_error" => JobStatus::SyncError,
            "source_task" => JobStatus::SourceTask,
            "source_poll_failed" => JobStatus::SourcePollFailed,
            "source_sync_error" => JobStatus::SourceSyncError,
            _ => JobStatus::Other(s.to_string()),
        }
    }

    /// Interprets a raw JSON status. Legacy documents stored a boolean.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(true) => Some(JobStatus::Completed),
            Value::Bool(false) => Some(JobStatus::Unknown),
            Value::String(s) => Some(JobStatus::parse(s)),
            other => Some(JobStatus::Other(other.to_string())),
        }
    }

    /// Statuses whose outcome is not yet known locally and should be
    /// re-queried against the vendor.
    pub fn is_indeterminate(&self) -> bool {
        match self {
            JobStatus::Unknown
            | JobStatus::Pending
            | JobStatus::Submitted
            | JobStatus::SubmittedWebhook
            | JobStatus::OnQueue
            | JobStatus::Processing
            | JobStatus::PollingFailed
            | JobStatus::SyncError => true,
            JobStatus::Other(s) => matches!(s.as_str(), "" | "error" | "pending_queue"),
            _ => false,
        }
    }

    /// Statuses carried by ancestor placeholders created during sync.
    pub fn is_source_placeholder(&self) -> bool {
        matches!(
            self,
            JobStatus::SourceTask | JobStatus::SourcePollFailed | JobStatus::SourceSyncError
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(JobStatus::from_value(&value).unwrap_or(JobStatus::Unknown))
    }
}

// ─── Seed ───────────────────────────────────────────────────────────────────

/// Seed reported by the vendor; numeric in current responses, a string in
/// some older ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seed {
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seed::Number(n) => write!(f, "{}", n),
            Seed::Text(s) => f.write_str(s),
        }
    }
}

// ─── Tags ───────────────────────────────────────────────────────────────────

/// Joins a raw tag value into the canonical comma-separated form.
///
/// Accepts a string (trimmed pieces re-joined) or a list of strings.
/// Returns `None` for null or when nothing remains.
pub fn canonical_tags(value: &Value) -> Option<String> {
    let pieces: Vec<String> = match value {
        Value::Null => return None,
        Value::String(s) => s.split(',').map(|p| p.trim().to_string()).collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .collect(),
        other => vec![other.to_string()],
    };

    let joined = pieces
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(",");

    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

fn deserialize_tags<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(canonical_tags))
}

// ─── JobRecord ──────────────────────────────────────────────────────────────

/// One job tracked in the metadata document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Local identifier assigned on first insert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Vendor job identifier. Empty only in damaged documents.
    #[serde(default)]
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<Seed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_tags",
        skip_serializing_if = "Option::is_none"
    )]
    pub variations: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_tags",
        skip_serializing_if = "Option::is_none"
    )]
    pub global_styles: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_code: Option<String>,
    /// Job this one was derived from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_job_id: Option<String>,
    /// Display form of the derivation, e.g. `upsample1_aaaaaa`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_added_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_updated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restored_at: Option<String>,
    /// Keys this version does not know about, kept so saves are lossless.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobRecord {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            ..Default::default()
        }
    }

    /// A parent reference, ignoring empty strings.
    pub fn parent_id(&self) -> Option<&str> {
        self.original_job_id.as_deref().filter(|s| !s.is_empty())
    }

    pub fn is_root(&self) -> bool {
        self.parent_id().is_none()
    }

    pub fn short_job_id(&self) -> &str {
        short_id(&self.job_id)
    }

    /// Filename without a trailing `.png`, lowercased for lookups.
    pub fn filename_key(&self) -> Option<String> {
        self.filename.as_deref().map(filename_key)
    }
}

/// Lookup key for filenames: lowercase with `.png` stripped.
pub fn filename_key(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.strip_suffix(".png") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

// ─── RecordUpdate ───────────────────────────────────────────────────────────

/// A change to one optional field of a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FieldUpdate<T> {
    #[default]
    Keep,
    Set(T),
    Clear,
}

impl<T> FieldUpdate<T> {
    fn apply_to(self, slot: &mut Option<T>) {
        match self {
            FieldUpdate::Keep => {}
            FieldUpdate::Set(value) => *slot = Some(value),
            FieldUpdate::Clear => *slot = None,
        }
    }

    pub fn is_keep(&self) -> bool {
        matches!(self, FieldUpdate::Keep)
    }
}

impl<T> From<Option<T>> for FieldUpdate<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => FieldUpdate::Set(v),
            None => FieldUpdate::Keep,
        }
    }
}

/// Shallow set of field changes merged into a record by an upsert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    pub id: FieldUpdate<String>,
    pub filename: FieldUpdate<String>,
    pub filepath: FieldUpdate<String>,
    pub url: FieldUpdate<String>,
    pub status: FieldUpdate<JobStatus>,
    pub seed: FieldUpdate<Seed>,
    pub prompt: FieldUpdate<String>,
    pub concept: FieldUpdate<String>,
    pub variations: FieldUpdate<String>,
    pub global_styles: FieldUpdate<String>,
    pub action_code: FieldUpdate<String>,
    pub original_job_id: FieldUpdate<String>,
    pub action: FieldUpdate<String>,
    pub created_at: FieldUpdate<String>,
    pub metadata_added_at: FieldUpdate<String>,
    pub metadata_updated_at: FieldUpdate<String>,
    pub restored_at: FieldUpdate<String>,
    pub extra: Map<String, Value>,
}

impl RecordUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = FieldUpdate::Set(status);
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = FieldUpdate::Set(url.into());
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = FieldUpdate::Set(prompt.into());
        self
    }

    pub fn concept(mut self, concept: impl Into<String>) -> Self {
        self.concept = FieldUpdate::Set(concept.into());
        self
    }

    pub fn lineage(mut self, original_job_id: impl Into<String>, action_code: impl Into<String>) -> Self {
        self.original_job_id = FieldUpdate::Set(original_job_id.into());
        self.action_code = FieldUpdate::Set(action_code.into());
        self
    }

    /// Records a successful download.
    pub fn stored_file(mut self, filename: impl Into<String>, filepath: impl Into<String>) -> Self {
        self.filename = FieldUpdate::Set(filename.into());
        self.filepath = FieldUpdate::Set(filepath.into());
        self
    }

    /// Forgets any local file location.
    pub fn clear_file(mut self) -> Self {
        self.filename = FieldUpdate::Clear;
        self.filepath = FieldUpdate::Clear;
        self
    }

    pub fn restored_at(mut self, timestamp: impl Into<String>) -> Self {
        self.restored_at = FieldUpdate::Set(timestamp.into());
        self
    }

    /// Merges the changes into `record`. The job id is never touched.
    pub fn apply(self, record: &mut JobRecord) {
        self.id.apply_to(&mut record.id);
        self.filename.apply_to(&mut record.filename);
        self.filepath.apply_to(&mut record.filepath);
        self.url.apply_to(&mut record.url);
        self.status.apply_to(&mut record.status);
        self.seed.apply_to(&mut record.seed);
        self.prompt.apply_to(&mut record.prompt);
        self.concept.apply_to(&mut record.concept);
        self.variations.apply_to(&mut record.variations);
        self.global_styles.apply_to(&mut record.global_styles);
        self.action_code.apply_to(&mut record.action_code);
        self.original_job_id.apply_to(&mut record.original_job_id);
        self.action.apply_to(&mut record.action);
        self.created_at.apply_to(&mut record.created_at);
        self.metadata_added_at.apply_to(&mut record.metadata_added_at);
        self.metadata_updated_at.apply_to(&mut record.metadata_updated_at);
        self.restored_at.apply_to(&mut record.restored_at);
        record.extra.extend(self.extra);
    }
}

impl RecordUpdate {
    /// Makes the stored record match `record` field for field: populated
    /// fields are set and absent ones cleared. Unknown keys are only added.
    pub fn replacing(record: JobRecord) -> Self {
        fn exact<T>(value: Option<T>) -> FieldUpdate<T> {
            match value {
                Some(v) => FieldUpdate::Set(v),
                None => FieldUpdate::Clear,
            }
        }

        Self {
            id: exact(record.id),
            filename: exact(record.filename),
            filepath: exact(record.filepath),
            url: exact(record.url),
            status: exact(record.status),
            seed: exact(record.seed),
            prompt: exact(record.prompt),
            concept: exact(record.concept),
            variations: exact(record.variations),
            global_styles: exact(record.global_styles),
            action_code: exact(record.action_code),
            original_job_id: exact(record.original_job_id),
            action: exact(record.action),
            created_at: exact(record.created_at),
            metadata_added_at: exact(record.metadata_added_at),
            metadata_updated_at: exact(record.metadata_updated_at),
            restored_at: exact(record.restored_at),
            extra: record.extra,
        }
    }
}

/// Every populated field of a record becomes a `Set`; absent fields are kept.
impl From<JobRecord> for RecordUpdate {
    fn from(record: JobRecord) -> Self {
        Self {
            id: record.id.into(),
            filename: record.filename.into(),
            filepath: record.filepath.into(),
            url: record.url.into(),
            status: record.status.into(),
            seed: record.seed.into(),
            prompt: record.prompt.into(),
            concept: record.concept.into(),
            variations: record.variations.into(),
            global_styles: record.global_styles.into(),
            action_code: record.action_code.into(),
            original_job_id: record.original_job_id.into(),
            action: record.action.into(),
            created_at: record.created_at.into(),
            metadata_added_at: record.metadata_added_at.into(),
            metadata_updated_at: record.metadata_updated_at.into(),
            restored_at: record.restored_at.into(),
            extra: record.extra,
        }
    }
}
