//! Rebuilding local metadata from the vendor's job history.

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, info_span, warn};

use crate::error::{StoreError, VendorError};
use crate::metadata::normalize::UNKNOWN_CONCEPT;
use crate::metadata::record::now_timestamp;
use crate::metadata::{normalize, JobRecord, MetadataStore, RecordUpdate};
use crate::state::StateFiles;
use crate::storage::ImageStorage;
use crate::vendor::VendorApi;

use super::artifact::{complete_job, overlay_non_null, Completion};

/// Concept given to restored root jobs that carry none.
pub const RESTORED_CONCEPT: &str = "restored";

#[derive(Debug, Clone, Copy)]
pub struct RestoreOptions {
    /// Look up each job individually when the listing lacks an image URL.
    pub fetch_details: bool,
    /// Download images for restored jobs.
    pub download: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            fetch_details: false,
            download: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub listed: usize,
    pub restored: usize,
    pub already_present: usize,
    pub downloaded: usize,
    pub failed: usize,
}

/// Reads up to `pages` pages of history, stopping at the first empty page.
pub fn fetch_remote_jobs<V: VendorApi + ?Sized>(
    vendor: &V,
    pages: u32,
    limit: u32,
) -> Result<Vec<Value>, VendorError> {
    let mut jobs = Vec::new();
    for page in 1..=pages {
        let batch = vendor.list(page, limit)?;
        info!(page, count = batch.len(), "Fetched job history page");
        if batch.is_empty() {
            break;
        }
        jobs.extend(batch);
    }
    Ok(jobs)
}

fn job_id_of(job: &Value) -> Option<&str> {
    job.get("jobId")
        .or_else(|| job.get("job_id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

/// Adds every listed job that is not yet tracked locally.
///
/// Jobs already in the store are left untouched. The last job whose image
/// was saved is written to the state files when `state` is given.
pub fn restore_from_remote<V: VendorApi + ?Sized>(
    store: &MetadataStore,
    vendor: &V,
    images: &ImageStorage,
    state: Option<&StateFiles>,
    jobs: &[Value],
    options: RestoreOptions,
) -> Result<RestoreReport, StoreError> {
    let _span = info_span!("restore", listed = jobs.len()).entered();
    let mut report = RestoreReport {
        listed: jobs.len(),
        ..Default::default()
    };
    let mut index = store.index();

    for job in jobs {
        let Some(job_id) = job_id_of(job) else {
            warn!("Skipping listed job without an id");
            report.failed += 1;
            continue;
        };
        if index.contains(job_id) {
            report.already_present += 1;
            continue;
        }

        let mut raw = job.clone();
        if options.fetch_details && raw.get("cdnImage").is_none_or(Value::is_null) {
            match vendor.fetch(job_id) {
                Ok(details) => overlay_non_null(&mut raw, &details),
                Err(e) => warn!(job_id, "Could not fetch job details: {}", e),
            }
        }

        let Some(mut record) = normalize(&raw, &index) else {
            report.failed += 1;
            continue;
        };
        record.job_id = job_id.to_string();
        if record.is_root()
            && record
                .concept
                .as_deref()
                .is_none_or(|c| c == UNKNOWN_CONCEPT)
        {
            record.concept = Some(RESTORED_CONCEPT.to_string());
        }
        record.restored_at = Some(now_timestamp());

        let stored = store.upsert(job_id, RecordUpdate::replacing(record))?;
        report.restored += 1;
        info!(job_id, "Restored job");

        let stored = if options.download && stored.url.is_some() {
            match restore_image(store, vendor, images, &stored)? {
                Completion::Saved { record, .. } => {
                    report.downloaded += 1;
                    if let Some(state) = state {
                        if let Err(e) = state.write_last_succeed_job_id(job_id) {
                            error!("Failed to write state file: {}", e);
                        }
                    }
                    record
                }
                Completion::NoUrl(record) => record,
                Completion::DownloadFailed { record, .. } => {
                    report.failed += 1;
                    record
                }
            }
        } else {
            stored
        };
        index.insert(stored);
    }

    info!(
        restored = report.restored,
        already_present = report.already_present,
        downloaded = report.downloaded,
        failed = report.failed,
        "Restore finished"
    );
    Ok(report)
}

fn restore_image<V: VendorApi + ?Sized>(
    store: &MetadataStore,
    vendor: &V,
    images: &ImageStorage,
    record: &JobRecord,
) -> Result<Completion, StoreError> {
    complete_job(store, vendor, images, record, &Value::Null, None)
}
