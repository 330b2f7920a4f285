//! JSON-file metadata store with atomic saves and corruption backups.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{CellCoverError, StoreError};
use crate::metadata::index::MetadataIndex;
use crate::metadata::record::{filename_key, now_timestamp, FieldUpdate, JobRecord, RecordUpdate};

/// File name of the metadata document inside the metadata directory.
pub const METADATA_FILENAME: &str = "images_metadata.json";

/// Version written for documents that have not been through a normalize pass.
pub const DEFAULT_VERSION: &str = "1.0";

const UUID_LEN: usize = 36;
const PREFIX_LEN: usize = 6;

// ─── Document ───────────────────────────────────────────────────────────────

/// The on-disk document: `{"images": [...], "version": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    pub images: Vec<JobRecord>,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

impl Default for MetadataDocument {
    fn default() -> Self {
        Self {
            images: Vec::new(),
            version: default_version(),
        }
    }
}

/// Result of reading the metadata file.
#[derive(Debug)]
pub enum LoadOutcome {
    /// File parsed, or was absent/empty and an empty document is returned.
    Loaded(MetadataDocument),
    /// File was unreadable as a metadata document and has been moved aside.
    CorruptBackedUp { backup: PathBuf },
    /// File could not be read, or could not be moved aside.
    IoError(StoreError),
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded(_))
    }

    /// Records of a successful load; empty otherwise.
    pub fn into_records(self) -> Vec<JobRecord> {
        match self {
            LoadOutcome::Loaded(document) => document.images,
            _ => Vec::new(),
        }
    }
}

/// Outcome of resolving a user supplied identifier.
#[derive(Debug, PartialEq)]
pub enum Resolution<'a> {
    Found(&'a JobRecord),
    NotFound,
    Ambiguous(Vec<&'a JobRecord>),
}

/// Resolves `identifier` against `records`:
/// a 36-character hyphenated id matches `job_id` exactly, a 6-character
/// value must be a unique `job_id` prefix, anything else is compared to the
/// stored filename with `.png` ignored.
pub fn resolve<'a>(records: &'a [JobRecord], identifier: &str) -> Resolution<'a> {
    let identifier = identifier.trim();
    let char_count = identifier.chars().count();

    if char_count == UUID_LEN && identifier.contains('-') {
        return match records.iter().rfind(|r| r.job_id == identifier) {
            Some(record) => Resolution::Found(record),
            None => Resolution::NotFound,
        };
    }

    if char_count == PREFIX_LEN {
        let mut seen = HashSet::new();
        let mut matches: Vec<&JobRecord> = records
            .iter()
            .rev()
            .filter(|r| r.job_id.starts_with(identifier))
            .filter(|r| seen.insert(r.job_id.clone()))
            .collect();
        matches.reverse();
        return match matches.len() {
            0 => Resolution::NotFound,
            1 => Resolution::Found(matches[0]),
            _ => Resolution::Ambiguous(matches),
        };
    }

    let wanted = filename_key(identifier);
    match records
        .iter()
        .find(|r| r.filename_key().is_some_and(|key| key == wanted))
    {
        Some(record) => Resolution::Found(record),
        None => Resolution::NotFound,
    }
}

/// Drops all but the last record for `job_id`, the one the index keeps.
fn fold_duplicates(records: &mut Vec<JobRecord>, job_id: &str) {
    let count = records.iter().filter(|r| r.job_id == job_id).count();
    if count < 2 {
        return;
    }
    log::warn!(
        "Folding {} records for job {} into the last occurrence",
        count,
        job_id
    );
    let mut remaining = count;
    records.retain(|r| {
        if r.job_id != job_id {
            return true;
        }
        remaining -= 1;
        remaining == 0
    });
}

// ─── MetadataStore ──────────────────────────────────────────────────────────

pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    /// Store backed by [`METADATA_FILENAME`] inside `metadata_dir`.
    pub fn new<P: AsRef<Path>>(metadata_dir: P) -> Self {
        Self {
            path: metadata_dir.as_ref().join(METADATA_FILENAME),
        }
    }

    /// Store backed by an explicit file path.
    pub fn at_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> LoadOutcome {
        if !self.path.exists() {
            return LoadOutcome::Loaded(MetadataDocument::default());
        }

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                log::error!("Failed to read metadata file {:?}: {}", self.path, e);
                return LoadOutcome::IoError(StoreError::ReadFile {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        if content.trim().is_empty() {
            return LoadOutcome::Loaded(MetadataDocument::default());
        }

        match parse_document(&content) {
            Ok(document) => LoadOutcome::Loaded(document),
            Err(reason) => {
                log::error!("Metadata file {:?} is corrupt: {}", self.path, reason);
                match self.backup_corrupt_file() {
                    Ok(backup) => {
                        log::warn!("Moved corrupt metadata file to {:?}", backup);
                        LoadOutcome::CorruptBackedUp { backup }
                    }
                    Err(e) => {
                        log::error!("{}", e);
                        LoadOutcome::IoError(e)
                    }
                }
            }
        }
    }

    /// All records, or an empty list when the file could not be loaded.
    pub fn records(&self) -> Vec<JobRecord> {
        self.load().into_records()
    }

    pub fn index(&self) -> MetadataIndex {
        MetadataIndex::build(&self.records())
    }

    /// Writes `records` as a fresh document with the default version.
    pub fn save(&self, records: &[JobRecord]) -> Result<(), StoreError> {
        self.save_document(&MetadataDocument {
            images: records.to_vec(),
            version: default_version(),
        })
    }

    /// Writes the document to a temp file and renames it over the target,
    /// so readers never see a partially written file.
    pub fn save_document(&self, document: &MetadataDocument) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            ensure_directory(parent)?;
        }

        let bytes = to_pretty_json(document)?;
        let tmp_path = self.temp_path();

        if let Err(e) = write_file(&tmp_path, &bytes) {
            let _ = std::fs::remove_file(&tmp_path);
            log::error!("{}", e);
            return Err(e);
        }

        if let Err(e) = std::fs::rename(&tmp_path, &self.path) {
            let _ = std::fs::remove_file(&tmp_path);
            let err = StoreError::Replace {
                from: tmp_path,
                to: self.path.clone(),
                source: e,
            };
            log::error!("{}", err);
            return Err(err);
        }

        Ok(())
    }

    /// Merges `update` into the record for `job_id`, inserting a new record
    /// when none exists, then persists. Returns the resulting record.
    pub fn upsert(
        &self,
        job_id: &str,
        update: impl Into<RecordUpdate>,
    ) -> Result<JobRecord, StoreError> {
        let mut document = self.load_for_write()?;
        let mut update = update.into();
        let now = now_timestamp();
        fold_duplicates(&mut document.images, job_id);

        let record = match document.images.iter_mut().find(|r| r.job_id == job_id) {
            Some(existing) => {
                if existing.id.is_some() {
                    update.id = FieldUpdate::Keep;
                }
                if existing.created_at.is_some() {
                    update.created_at = FieldUpdate::Keep;
                }
                update.metadata_updated_at = FieldUpdate::Set(now);
                update.apply(existing);
                if existing.id.is_none() {
                    existing.id = Some(Uuid::new_v4().to_string());
                }
                existing.clone()
            }
            None => {
                let mut record = JobRecord::new(job_id);
                update.apply(&mut record);
                if record.id.is_none() {
                    record.id = Some(Uuid::new_v4().to_string());
                }
                if record.metadata_added_at.is_none() {
                    record.metadata_added_at = Some(now.clone());
                }
                if record.created_at.is_none() {
                    record.created_at = Some(now);
                }
                document.images.push(record.clone());
                record
            }
        };

        self.save_document(&document)?;
        Ok(record)
    }

    /// Deletes the record for `job_id`. Returns `false` when no record matched.
    pub fn remove(&self, job_id: &str) -> Result<bool, StoreError> {
        let mut document = self.load_for_write()?;
        let before = document.images.len();
        document.images.retain(|r| r.job_id != job_id);

        if document.images.len() == before {
            log::warn!("No metadata record for job {} to remove", job_id);
            return Ok(false);
        }

        self.save_document(&document)?;
        Ok(true)
    }

    /// Finds a record by full id, unique 6-character prefix, or filename.
    /// Ambiguous prefixes are logged and yield `None`.
    pub fn find(&self, identifier: &str) -> Option<JobRecord> {
        self.lookup(identifier).ok()
    }

    /// Like [`find`](Self::find), but says why nothing was returned.
    pub fn lookup(&self, identifier: &str) -> crate::error::Result<JobRecord> {
        let records = self.records();
        match resolve(&records, identifier) {
            Resolution::Found(record) => Ok(record.clone()),
            Resolution::NotFound => Err(CellCoverError::JobNotFound(identifier.to_string())),
            Resolution::Ambiguous(candidates) => {
                for candidate in &candidates {
                    log::warn!(
                        "  candidate {} ({})",
                        candidate.job_id,
                        candidate.filename.as_deref().unwrap_or("-")
                    );
                }
                log::warn!(
                    "Identifier '{}' matches {} jobs; use a longer id",
                    identifier,
                    candidates.len()
                );
                Err(CellCoverError::AmbiguousIdentifier {
                    identifier: identifier.to_string(),
                    count: candidates.len(),
                })
            }
        }
    }

    /// Document for a read-modify-write cycle. A corrupt file has already
    /// been moved aside, so starting from an empty document loses nothing.
    fn load_for_write(&self) -> Result<MetadataDocument, StoreError> {
        match self.load() {
            LoadOutcome::Loaded(document) => Ok(document),
            LoadOutcome::CorruptBackedUp { backup } => {
                log::warn!(
                    "Starting a new metadata document; previous contents are in {:?}",
                    backup
                );
                Ok(MetadataDocument::default())
            }
            LoadOutcome::IoError(e) => Err(e),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn backup_corrupt_file(&self) -> Result<PathBuf, StoreError> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut base = self.path.as_os_str().to_owned();
        base.push(format!(".bak.{}", stamp));

        let mut backup = PathBuf::from(&base);
        let mut counter = 2;
        while backup.exists() {
            let mut candidate = base.clone();
            candidate.push(format!("_{}", counter));
            backup = PathBuf::from(candidate);
            counter += 1;
        }

        std::fs::rename(&self.path, &backup).map_err(|e| StoreError::Backup {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(backup)
    }
}

fn parse_document(content: &str) -> Result<MetadataDocument, String> {
    let value: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;

    let has_images_list = value
        .as_object()
        .and_then(|obj| obj.get("images"))
        .is_some_and(Value::is_array);
    if !has_images_list {
        return Err("expected an object with an \"images\" list".to_string());
    }

    serde_json::from_value(value).map_err(|e| e.to_string())
}

/// Serializes with four-space indentation.
pub(crate) fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    Ok(buf)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let to_err = |e| StoreError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    };
    let mut file = std::fs::File::create(path).map_err(to_err)?;
    file.write_all(bytes).map_err(to_err)?;
    file.sync_all().map_err(to_err)?;
    Ok(())
}

fn ensure_directory(path: &Path) -> Result<(), StoreError> {
    if !path.as_os_str().is_empty() && !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StoreError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}
