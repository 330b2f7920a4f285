//! Turning a finished vendor job into a stored record and image file.

use std::path::PathBuf;

use chrono::Local;
use serde_json::Value;
use tracing::{info_span, warn};

use crate::error::StoreError;
use crate::metadata::{derive_filename, normalize, JobRecord, JobStatus, MetadataStore, RecordUpdate};
use crate::sanitize::redact_path;
use crate::storage::ImageStorage;
use crate::vendor::VendorApi;

/// What happened to a job the vendor reported as successful.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Image downloaded and recorded; status `completed`.
    Saved { record: JobRecord, path: PathBuf },
    /// The vendor returned no image URL; status `completed_no_url`.
    NoUrl(JobRecord),
    /// Download or write failed; status `file_missing`, paths cleared.
    DownloadFailed { record: JobRecord, reason: String },
}

impl Completion {
    pub fn record(&self) -> &JobRecord {
        match self {
            Completion::Saved { record, .. }
            | Completion::NoUrl(record)
            | Completion::DownloadFailed { record, .. } => record,
        }
    }
}

/// Copies every non-null field of `overlay` into `base` when both are
/// objects.
pub fn overlay_non_null(base: &mut Value, overlay: &Value) {
    if let (Value::Object(target), Value::Object(source)) = (base, overlay) {
        for (key, value) in source {
            if !value.is_null() {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Overlays the vendor's non-null fields onto the local record.
pub fn merge_vendor_data(local: &JobRecord, data: &Value) -> Value {
    let mut merged =
        serde_json::to_value(local).unwrap_or_else(|_| Value::Object(Default::default()));
    overlay_non_null(&mut merged, data);
    merged
}

/// Normalizes the merged record, persists it, then downloads and stores the
/// image under a derived filename.
///
/// Store errors abort; vendor and storage errors become a `file_missing`
/// record.
pub fn complete_job<V: VendorApi + ?Sized>(
    store: &MetadataStore,
    vendor: &V,
    images: &ImageStorage,
    local: &JobRecord,
    data: &Value,
    prefix: Option<&str>,
) -> Result<Completion, StoreError> {
    let job_id = local.job_id.as_str();
    let _span = info_span!("complete_job", job_id).entered();

    let index = store.index();
    let merged = merge_vendor_data(local, data);
    let mut normalized = normalize(&merged, &index).unwrap_or_else(|| local.clone());
    normalized.job_id = job_id.to_string();

    let record = store.upsert(job_id, RecordUpdate::replacing(normalized))?;

    let Some(url) = record.url.clone() else {
        warn!("Vendor reported success without an image URL");
        let record = store.upsert(job_id, RecordUpdate::new().status(JobStatus::CompletedNoUrl))?;
        return Ok(Completion::NoUrl(record));
    };

    let filename = derive_filename(&record, &index, prefix, Local::now().naive_local());
    let saved = vendor
        .download(&url)
        .map_err(|e| e.to_string())
        .and_then(|bytes| images.store(&bytes, &filename).map_err(|e| e.to_string()));

    match saved {
        Ok(path) => {
            let stored_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(filename);
            tracing::info!(file = %redact_path(&path), "Saved image");
            let record = store.upsert(
                job_id,
                RecordUpdate::new()
                    .status(JobStatus::Completed)
                    .stored_file(stored_name, path.to_string_lossy()),
            )?;
            Ok(Completion::Saved { record, path })
        }
        Err(reason) => {
            tracing::error!("Image download failed: {}", reason);
            let record = store.upsert(
                job_id,
                RecordUpdate::new().status(JobStatus::FileMissing).clear_file(),
            )?;
            Ok(Completion::DownloadFailed { record, reason })
        }
    }
}
