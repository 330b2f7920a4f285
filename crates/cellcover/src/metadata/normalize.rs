//! Canonical record shape for vendor responses and stored records.
//!
//! Derived jobs never keep their own concept/variations/styles: those are
//! always copied from the root of their lineage, so every record produced
//! from the same original generation carries the same creative tags.

use chrono::Local;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::StoreError;
use crate::metadata::index::MetadataIndex;
use crate::metadata::lineage::trace_ancestry;
use crate::metadata::record::{
    canonical_tags, now_timestamp, short_id, JobRecord, JobStatus, Seed,
};
use crate::metadata::store::{LoadOutcome, MetadataDocument, MetadataStore};

/// Keys kept from raw input. Everything else is vendor noise.
pub const ALLOWED_FIELDS: &[&str] = &[
    "id",
    "job_id",
    "status",
    "url",
    "seed",
    "prompt",
    "concept",
    "variations",
    "global_styles",
    "action_code",
    "original_job_id",
    "action",
    "created_at",
    "metadata_added_at",
    "metadata_updated_at",
    "restored_at",
    "filename",
    "filepath",
];

/// Concept assigned when a record has no usable concept of its own.
pub const UNKNOWN_CONCEPT: &str = "unknown";

/// Concepts starting with one of these were written as stand-ins and do not
/// name a real template.
pub const RESERVED_CONCEPT_PREFIXES: &[&str] = &["placeholder", "source_task"];

/// Action shown for root jobs.
pub const CREATE_ACTION: &str = "create";

/// Document version written by [`normalize_all`].
pub const NORMALIZED_VERSION: &str = "1.1";

// ─── Single record ──────────────────────────────────────────────────────────

/// Produces the canonical record for a raw vendor response or partial local
/// record. Returns `None` when `raw` is not a JSON object.
///
/// Reads lineage from `index` only; the store is never touched.
pub fn normalize(raw: &Value, index: &MetadataIndex) -> Option<JobRecord> {
    let Some(object) = raw.as_object() else {
        log::warn!("Cannot normalize a non-object value: {}", raw);
        return None;
    };

    let mut record = extract_allowed(object);

    match (record.parent_id().map(str::to_string), record.action_code.clone()) {
        (Some(original), Some(code)) => {
            record.action = Some(format!("{}_{}", code, short_id(&original)));
        }
        (Some(original), None) => {
            log::warn!(
                "Job {} has original_job_id {} but no action_code",
                record.job_id,
                original
            );
            record.action = Some(format!("unknown_action_{}", short_id(&original)));
            record.action_code = None;
        }
        (None, Some(code)) => {
            log::warn!(
                "Job {} has action_code {} but no original_job_id",
                record.job_id,
                code
            );
            record.action = Some(code);
        }
        (None, None) => {
            record.action = Some(CREATE_ACTION.to_string());
        }
    }

    match record.parent_id().map(str::to_string) {
        None => {
            let (concept, variations, styles) = creative_tags(&record);
            record.concept = Some(concept);
            record.variations = variations;
            record.global_styles = styles;
        }
        Some(original) => inherit_from_lineage(&mut record, &original, index),
    }

    Some(record)
}

/// Normalizes an already typed record. Unknown keys are dropped.
pub fn normalize_record(record: &JobRecord, index: &MetadataIndex) -> JobRecord {
    match serde_json::to_value(record) {
        Ok(value) => normalize(&value, index).unwrap_or_else(|| record.clone()),
        Err(e) => {
            log::error!("Failed to serialize record {}: {}", record.job_id, e);
            record.clone()
        }
    }
}

fn inherit_from_lineage(record: &mut JobRecord, original: &str, index: &MetadataIndex) {
    let lineage = trace_ancestry(original, index);

    let source = match (lineage.root(), lineage.origin()) {
        (Some(root), _) => Some(root),
        (None, Some(origin)) => {
            log::warn!(
                "Lineage of {} does not reach a root ({:?}); using {} as origin",
                record.job_id,
                lineage.broken,
                origin.job_id
            );
            Some(origin)
        }
        (None, None) => {
            log::warn!(
                "Source job {} of {} is not in local metadata",
                original,
                record.job_id
            );
            None
        }
    };

    match source {
        Some(source) => {
            let (concept, variations, styles) = creative_tags(source);
            record.concept = Some(concept);
            record.variations = variations;
            record.global_styles = styles;
        }
        None => {
            record.concept = Some(UNKNOWN_CONCEPT.to_string());
            record.variations = None;
            record.global_styles = None;
        }
    }
}

/// Concept and tags of a root record, with placeholder concepts collapsed
/// to `unknown` and their tags cleared.
fn creative_tags(record: &JobRecord) -> (String, Option<String>, Option<String>) {
    match record.concept.as_deref().map(str::trim) {
        Some(concept) if is_authored_concept(concept) => (
            concept.to_string(),
            record.variations.clone(),
            record.global_styles.clone(),
        ),
        _ => (UNKNOWN_CONCEPT.to_string(), None, None),
    }
}

/// The concept a record is filed under: its own when authored, else `unknown`.
pub(crate) fn effective_concept(concept: Option<&str>) -> &str {
    match concept.map(str::trim) {
        Some(concept) if is_authored_concept(concept) => concept,
        _ => UNKNOWN_CONCEPT,
    }
}

fn is_authored_concept(concept: &str) -> bool {
    !concept.is_empty()
        && !concept.eq_ignore_ascii_case(UNKNOWN_CONCEPT)
        && !RESERVED_CONCEPT_PREFIXES
            .iter()
            .any(|prefix| concept.to_ascii_lowercase().starts_with(prefix))
}

fn extract_allowed(object: &Map<String, Value>) -> JobRecord {
    let get = |key: &str| object.get(key);

    let job_id = text(get("job_id"))
        .or_else(|| text(get("jobId")))
        .unwrap_or_default();
    let url = text(get("cdnImage")).or_else(|| text(get("url")));

    JobRecord {
        id: text(get("id")),
        job_id,
        filename: text(get("filename")),
        filepath: text(get("filepath")),
        url,
        status: get("status").and_then(JobStatus::from_value),
        seed: get("seed").and_then(seed),
        prompt: text(get("prompt")),
        concept: text(get("concept")),
        variations: get("variations").and_then(canonical_tags),
        global_styles: get("global_styles").and_then(canonical_tags),
        action_code: text(get("action_code")),
        original_job_id: text(get("original_job_id")),
        action: text(get("action")),
        created_at: text(get("created_at")),
        metadata_added_at: text(get("metadata_added_at")),
        metadata_updated_at: text(get("metadata_updated_at")),
        restored_at: text(get("restored_at")),
        extra: Map::new(),
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn seed(value: &Value) -> Option<Seed> {
    match value {
        Value::Number(n) => Some(Seed::Number(n.clone())),
        Value::String(s) if !s.is_empty() => Some(Seed::Text(s.clone())),
        _ => None,
    }
}

// ─── Whole document ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    /// Report changes without writing.
    pub dry_run: bool,
    /// Copy the current file aside before writing.
    pub backup: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub total: usize,
    pub changed: usize,
    pub skipped: usize,
    pub saved: bool,
}

/// Rewrites every record in the store through [`normalize`].
///
/// Records without a `job_id` are kept as they are. Missing ids, creation
/// times and statuses are filled in; the document version becomes
/// [`NORMALIZED_VERSION`].
pub fn normalize_all(
    store: &MetadataStore,
    options: NormalizeOptions,
) -> Result<NormalizeReport, StoreError> {
    let document = match store.load() {
        LoadOutcome::Loaded(document) => document,
        LoadOutcome::CorruptBackedUp { backup } => return Err(StoreError::Corrupt { backup }),
        LoadOutcome::IoError(e) => return Err(e),
    };

    let index = MetadataIndex::build(&document.images);
    let now = now_timestamp();
    let mut report = NormalizeReport {
        total: document.images.len(),
        ..Default::default()
    };

    let mut images = Vec::with_capacity(document.images.len());
    for record in &document.images {
        if record.job_id.is_empty() {
            log::warn!("Skipping record without job_id (id: {:?})", record.id);
            report.skipped += 1;
            images.push(record.clone());
            continue;
        }

        let mut normalized = normalize_record(record, &index);
        fill_defaults(&mut normalized, &now);

        let changes = changed_fields(record, &normalized);
        if !changes.is_empty() {
            log::info!("{}: {}", record.job_id, changes.join(", "));
            report.changed += 1;
        }
        images.push(normalized);
    }

    if options.dry_run {
        log::info!(
            "Dry run: {} of {} records would change",
            report.changed,
            report.total
        );
        return Ok(report);
    }

    if options.backup && store.path().exists() {
        let backup = backup_path(store);
        std::fs::copy(store.path(), &backup).map_err(|e| StoreError::Backup {
            path: store.path().to_path_buf(),
            source: e,
        })?;
        log::info!("Backed up metadata to {:?}", backup);
    }

    store.save_document(&MetadataDocument {
        images,
        version: NORMALIZED_VERSION.to_string(),
    })?;
    report.saved = true;
    Ok(report)
}

fn fill_defaults(record: &mut JobRecord, now: &str) {
    if record.id.is_none() {
        record.id = Some(Uuid::new_v4().to_string());
    }
    if record.created_at.is_none() {
        record.created_at = record
            .metadata_added_at
            .clone()
            .or_else(|| record.restored_at.clone())
            .or_else(|| Some(now.to_string()));
    }
    if record.status.is_none() {
        record.status = Some(if record.url.is_some() {
            JobStatus::Completed
        } else {
            JobStatus::Unknown
        });
    }
}

/// Names of top-level fields that differ between two records.
fn changed_fields(before: &JobRecord, after: &JobRecord) -> Vec<String> {
    let (Ok(Value::Object(before)), Ok(Value::Object(after))) =
        (serde_json::to_value(before), serde_json::to_value(after))
    else {
        return Vec::new();
    };

    let mut keys: Vec<&String> = before.keys().chain(after.keys()).collect();
    keys.sort();
    keys.dedup();
    keys.into_iter()
        .filter(|key| before.get(*key) != after.get(*key))
        .map(|key| key.to_string())
        .collect()
}

fn backup_path(store: &MetadataStore) -> std::path::PathBuf {
    let mut name = store.path().as_os_str().to_owned();
    name.push(format!(
        ".pre-normalize.{}",
        Local::now().format("%Y%m%d_%H%M%S")
    ));
    std::path::PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const ROOT_ID: &str = "aaaaaa11-1111-1111-1111-111111111111";
    const CHILD_ID: &str = "bbbbbb22-2222-2222-2222-222222222222";

    fn root() -> JobRecord {
        let mut record = JobRecord::new(ROOT_ID);
        record.concept = Some("concept_a".to_string());
        record.variations = Some("warm,soft".to_string());
        record.global_styles = Some("film".to_string());
        record
    }

    #[test]
    fn test_vendor_keys_are_folded_and_noise_dropped() {
        let raw = json!({
            "jobId": "job-1",
            "cdnImage": "https://cdn.example/img.png",
            "status": "SUCCESS",
            "width": 1024,
            "quota": 3,
            "concept": "sunset"
        });

        let record = normalize(&raw, &MetadataIndex::default()).unwrap();

        assert_eq!(record.job_id, "job-1");
        assert_eq!(record.url.as_deref(), Some("https://cdn.example/img.png"));
        assert_eq!(record.status, Some(JobStatus::Completed));
        assert!(record.extra.is_empty());
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("jobId").is_none());
        assert!(value.get("cdnImage").is_none());
        assert!(value.get("width").is_none());
    }

    #[test]
    fn test_legacy_boolean_status() {
        let record = normalize(&json!({"job_id": "j", "status": true}), &MetadataIndex::default())
            .unwrap();
        assert_eq!(record.status, Some(JobStatus::Completed));
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(normalize(&json!("nope"), &MetadataIndex::default()).is_none());
        assert!(normalize(&Value::Null, &MetadataIndex::default()).is_none());
    }

    #[test]
    fn test_root_gets_create_action_and_own_tags() {
        let record = normalize_record(&root(), &MetadataIndex::default());

        assert_eq!(record.action.as_deref(), Some("create"));
        assert_eq!(record.concept.as_deref(), Some("concept_a"));
        assert_eq!(record.variations.as_deref(), Some("warm,soft"));
    }

    #[test]
    fn test_root_placeholder_concept_clears_tags() {
        for concept in ["", "unknown", "placeholder_concept", "source_task"] {
            let mut record = root();
            record.concept = Some(concept.to_string());
            let normalized = normalize_record(&record, &MetadataIndex::default());
            assert_eq!(normalized.concept.as_deref(), Some("unknown"));
            assert!(normalized.variations.is_none());
            assert!(normalized.global_styles.is_none());
        }
    }

    #[test]
    fn test_derived_action_and_inherited_concept() {
        let index = MetadataIndex::build(&[root()]);
        let mut child = JobRecord::new(CHILD_ID);
        child.original_job_id = Some(ROOT_ID.to_string());
        child.action_code = Some("upsample1".to_string());
        child.concept = Some("stale".to_string());

        let normalized = normalize_record(&child, &index);

        assert_eq!(normalized.concept.as_deref(), Some("concept_a"));
        assert_eq!(normalized.action.as_deref(), Some("upsample1_aaaaaa"));
        assert_eq!(normalized.variations.as_deref(), Some("warm,soft"));
        assert_eq!(normalized.global_styles.as_deref(), Some("film"));
    }

    #[test]
    fn test_multi_hop_uses_root_not_parent() {
        let mut parent = JobRecord::new("parent");
        parent.original_job_id = Some(ROOT_ID.to_string());
        parent.action_code = Some("variation1".to_string());
        parent.concept = Some("parent_concept".to_string());
        parent.variations = Some("parent_tags".to_string());

        let index = MetadataIndex::build(&[root(), parent]);
        let raw = json!({
            "jobId": "grandchild",
            "original_job_id": "parent",
            "action_code": "upsample2"
        });

        let normalized = normalize(&raw, &index).unwrap();

        assert_eq!(normalized.concept.as_deref(), Some("concept_a"));
        assert_eq!(normalized.variations.as_deref(), Some("warm,soft"));
        assert_eq!(normalized.action.as_deref(), Some("upsample2_parent"));
    }

    #[test]
    fn test_missing_action_code_gets_placeholder_action() {
        let index = MetadataIndex::build(&[root()]);
        let raw = json!({"job_id": "c", "original_job_id": ROOT_ID});

        let normalized = normalize(&raw, &index).unwrap();

        assert_eq!(normalized.action.as_deref(), Some("unknown_action_aaaaaa"));
        assert!(normalized.action_code.is_none());
    }

    #[test]
    fn test_action_code_without_parent_is_kept_verbatim() {
        let raw = json!({"job_id": "c", "action_code": "reroll", "concept": "x"});
        let normalized = normalize(&raw, &MetadataIndex::default()).unwrap();
        assert_eq!(normalized.action.as_deref(), Some("reroll"));
    }

    #[test]
    fn test_dangling_parent_yields_unknown_concept() {
        let raw = json!({
            "job_id": "c",
            "original_job_id": "missing-parent",
            "action_code": "upsample1",
            "concept": "own"
        });
        let normalized = normalize(&raw, &MetadataIndex::default()).unwrap();
        assert_eq!(normalized.concept.as_deref(), Some("unknown"));
        assert!(normalized.variations.is_none());
    }

    #[test]
    fn test_partial_chain_uses_earliest_ancestor() {
        let mut orphan = JobRecord::new("orphan");
        orphan.original_job_id = Some("gone".to_string());
        orphan.action_code = Some("upsample1".to_string());
        orphan.concept = Some("orphan_concept".to_string());
        let index = MetadataIndex::build(&[orphan]);

        let raw = json!({"job_id": "c", "original_job_id": "orphan", "action_code": "upsample2"});
        let normalized = normalize(&raw, &index).unwrap();

        assert_eq!(normalized.concept.as_deref(), Some("orphan_concept"));
    }

    #[test]
    fn test_list_tags_become_comma_joined() {
        let raw = json!({"job_id": "j", "concept": "c", "variations": ["a", "b"], "global_styles": "x, y"});
        let normalized = normalize(&raw, &MetadataIndex::default()).unwrap();
        assert_eq!(normalized.variations.as_deref(), Some("a,b"));
        assert_eq!(normalized.global_styles.as_deref(), Some("x,y"));
    }

    #[test]
    fn test_normalize_all_fills_defaults_and_bumps_version() {
        let temp_dir = TempDir::new().unwrap();
        let store = MetadataStore::new(temp_dir.path());

        let mut with_url = root();
        with_url.url = Some("https://cdn/x.png".to_string());
        with_url.metadata_added_at = Some("2024-01-01T00:00:00+00:00".to_string());
        let no_id = JobRecord::default();
        store.save(&[with_url, no_id]).unwrap();

        let report = normalize_all(&store, NormalizeOptions::default()).unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.changed, 1);
        assert!(report.saved);

        match store.load() {
            LoadOutcome::Loaded(document) => {
                assert_eq!(document.version, NORMALIZED_VERSION);
                let first = &document.images[0];
                assert_eq!(first.status, Some(JobStatus::Completed));
                assert_eq!(first.created_at.as_deref(), Some("2024-01-01T00:00:00+00:00"));
                assert!(first.id.is_some());
                assert_eq!(document.images.len(), 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_normalize_all_dry_run_does_not_write() {
        let temp_dir = TempDir::new().unwrap();
        let store = MetadataStore::new(temp_dir.path());
        store.save(&[root()]).unwrap();
        let before = std::fs::read_to_string(store.path()).unwrap();

        let report = normalize_all(
            &store,
            NormalizeOptions {
                dry_run: true,
                backup: false,
            },
        )
        .unwrap();

        assert_eq!(report.changed, 1);
        assert!(!report.saved);
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn test_normalize_all_backup_copies_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = MetadataStore::new(temp_dir.path());
        store.save(&[root()]).unwrap();

        normalize_all(
            &store,
            NormalizeOptions {
                dry_run: false,
                backup: true,
            },
        )
        .unwrap();

        let backups: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".pre-normalize."))
            .collect();
        assert_eq!(backups.len(), 1);
    }
}
