use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use tracing::{error, info, info_span, warn};

use crate::error::StoreError;
use crate::metadata::{JobRecord, JobStatus, LoadOutcome, MetadataIndex, MetadataStore, RecordUpdate};
use crate::storage::ImageStorage;
use crate::vendor::{PollOutcome, VendorApi};

use super::artifact::{complete_job, Completion};

/// Concept given to ancestor placeholders.
pub const SOURCE_TASK_CONCEPT: &str = "source_task";

/// Ids shorter than this that start with an action name are action codes
/// stored in the wrong field, not job ids.
const MIN_JOB_ID_LEN: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SyncReport {
    fn count(&mut self, completion: &Completion) {
        match completion {
            Completion::Saved { .. } => self.succeeded += 1,
            Completion::NoUrl(_) => self.skipped += 1,
            Completion::DownloadFailed { .. } => self.failed += 1,
        }
    }
}

/// Records whose outcome should be re-queried: indeterminate statuses and
/// completed records whose image file is gone.
pub fn needs_sync(record: &JobRecord) -> bool {
    match &record.status {
        None => true,
        Some(JobStatus::Completed) => !record
            .filepath
            .as_deref()
            .is_some_and(|p| Path::new(p).exists()),
        Some(status) => status.is_indeterminate(),
    }
}

pub fn looks_like_action_code(job_id: &str) -> bool {
    (job_id.starts_with("upsample") || job_id.starts_with("variation"))
        && job_id.len() < MIN_JOB_ID_LEN
}

/// Ancestor to fetch in the second phase, with the job that referenced it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    job_id: String,
    referenced_by: Option<String>,
}

pub struct SyncDriver<'a, V: VendorApi + ?Sized> {
    store: &'a MetadataStore,
    vendor: &'a V,
    images: &'a ImageStorage,
}

impl<'a, V: VendorApi + ?Sized> SyncDriver<'a, V> {
    pub fn new(store: &'a MetadataStore, vendor: &'a V, images: &'a ImageStorage) -> Self {
        Self {
            store,
            vendor,
            images,
        }
    }

    /// Reconciles every unresolved record, then fetches missing ancestors.
    ///
    /// Only an unreadable metadata file is returned as an error; per-job
    /// failures are counted and logged.
    pub fn run(&self) -> Result<SyncReport, StoreError> {
        let records = match self.store.load() {
            LoadOutcome::Loaded(document) => document.images,
            LoadOutcome::CorruptBackedUp { backup } => {
                warn!("Metadata was corrupt and has been backed up to {:?}", backup);
                Vec::new()
            }
            LoadOutcome::IoError(e) => return Err(e),
        };

        let _span = info_span!("sync", records = records.len()).entered();
        let mut report = SyncReport::default();

        let processed = self.sync_tracked(&records, &mut report);
        self.sync_ancestors(&processed, &mut report);

        info!(
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            "Sync finished"
        );
        Ok(report)
    }

    // ─── Phase 1 ────────────────────────────────────────────────────────────

    fn sync_tracked(&self, records: &[JobRecord], report: &mut SyncReport) -> HashSet<String> {
        let mut processed = HashSet::new();

        for record in records {
            if record.job_id.is_empty() || !needs_sync(record) {
                // Placeholders are counted when phase 2 retries them.
                if record.job_id.is_empty() || !is_placeholder(record) {
                    report.skipped += 1;
                }
                continue;
            }
            processed.insert(record.job_id.clone());
            let _span = info_span!("sync_job", job_id = %record.job_id).entered();
            info!(status = ?record.status, "Checking job");

            if let Err(e) = self.sync_one(record, report) {
                error!("Failed to update metadata: {}", e);
                report.failed += 1;
            }
        }

        processed
    }

    fn sync_one(&self, record: &JobRecord, report: &mut SyncReport) -> Result<(), StoreError> {
        let job_id = record.job_id.as_str();

        match self.vendor.poll(job_id) {
            Ok(PollOutcome::Success(data)) => {
                let completion =
                    complete_job(self.store, self.vendor, self.images, record, &data, None)?;
                report.count(&completion);
            }
            Ok(PollOutcome::Failed { message, .. }) => {
                warn!("Vendor reports job failed ({}); removing record", message);
                self.store.remove(job_id)?;
                report.failed += 1;
            }
            Ok(PollOutcome::TimedOut) => {
                self.store
                    .upsert(job_id, RecordUpdate::new().status(JobStatus::PollingFailed))?;
                report.skipped += 1;
            }
            Err(e) => {
                error!("Vendor request failed: {}", e);
                self.store
                    .upsert(job_id, RecordUpdate::new().status(JobStatus::SyncError))?;
                report.failed += 1;
            }
        }
        Ok(())
    }

    // ─── Phase 2 ────────────────────────────────────────────────────────────

    fn sync_ancestors(&self, processed: &HashSet<String>, report: &mut SyncReport) {
        let records = self.store.records();
        let candidates = ancestor_candidates(&records, processed);
        if candidates.is_empty() {
            return;
        }
        info!(count = candidates.len(), "Fetching source jobs");

        let index = MetadataIndex::build(&records);
        for candidate in candidates {
            let _span = info_span!("sync_source", job_id = %candidate.job_id).entered();
            if let Err(e) = self.sync_source(&candidate, &index, report) {
                error!("Failed to update metadata: {}", e);
                report.failed += 1;
            }
        }
    }

    fn sync_source(
        &self,
        candidate: &Candidate,
        index: &MetadataIndex,
        report: &mut SyncReport,
    ) -> Result<(), StoreError> {
        let job_id = candidate.job_id.as_str();

        let local = match index.get(job_id) {
            Some(existing) => existing.clone(),
            None => {
                let referenced_by = candidate.referenced_by.as_deref().unwrap_or("unknown");
                self.store.upsert(
                    job_id,
                    RecordUpdate::new()
                        .status(JobStatus::SourceTask)
                        .concept(SOURCE_TASK_CONCEPT)
                        .prompt(format!("Source for: {}", referenced_by)),
                )?
            }
        };

        match self.vendor.poll(job_id) {
            Ok(PollOutcome::Success(data)) => {
                let completion =
                    complete_job(self.store, self.vendor, self.images, &local, &data, None)?;
                report.count(&completion);
            }
            Ok(PollOutcome::Failed { message, .. }) => {
                warn!("Source job failed at the vendor: {}", message);
                self.store
                    .upsert(job_id, RecordUpdate::new().status(JobStatus::Failed))?;
                report.failed += 1;
            }
            Ok(PollOutcome::TimedOut) => {
                self.store
                    .upsert(job_id, RecordUpdate::new().status(JobStatus::SourcePollFailed))?;
                report.skipped += 1;
            }
            Err(e) => {
                error!("Vendor request failed: {}", e);
                self.store
                    .upsert(job_id, RecordUpdate::new().status(JobStatus::SourceSyncError))?;
                report.failed += 1;
            }
        }
        Ok(())
    }
}

fn is_placeholder(record: &JobRecord) -> bool {
    record
        .status
        .as_ref()
        .is_some_and(JobStatus::is_source_placeholder)
}

/// Dangling ancestors plus unresolved placeholders, each listed once and
/// skipping anything phase 1 already handled.
fn ancestor_candidates(records: &[JobRecord], processed: &HashSet<String>) -> Vec<Candidate> {
    let index = MetadataIndex::build(records);
    let mut seen: HashSet<&str> = HashSet::new();
    let mut candidates = Vec::new();

    for record in records {
        if let Some(parent) = record.parent_id() {
            if !index.contains(parent) && !processed.contains(parent) && seen.insert(parent) {
                if looks_like_action_code(parent) {
                    warn!(
                        "Job {} names {} as its source, which looks like an action code; skipping",
                        record.job_id, parent
                    );
                } else {
                    candidates.push(Candidate {
                        job_id: parent.to_string(),
                        referenced_by: Some(record.job_id.clone()),
                    });
                }
            }
        }

        if is_placeholder(record)
            && !record.job_id.is_empty()
            && !processed.contains(&record.job_id)
            && seen.insert(record.job_id.as_str())
        {
            candidates.push(Candidate {
                job_id: record.job_id.clone(),
                referenced_by: None,
            });
        }
    }

    candidates
}

/// Runs both sync phases with a [`SyncDriver`].
pub fn sync<V: VendorApi + ?Sized>(
    store: &MetadataStore,
    vendor: &V,
    images: &ImageStorage,
) -> Result<SyncReport, StoreError> {
    SyncDriver::new(store, vendor, images).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(job_id: &str, status: Option<JobStatus>) -> JobRecord {
        JobRecord {
            status,
            ..JobRecord::new(job_id)
        }
    }

    #[test]
    fn test_needs_sync() {
        assert!(needs_sync(&record("a", None)));
        assert!(needs_sync(&record("a", Some(JobStatus::Submitted))));
        assert!(needs_sync(&record("a", Some(JobStatus::PollingFailed))));
        assert!(needs_sync(&record("a", Some(JobStatus::Other("pending_queue".into())))));
        assert!(!needs_sync(&record("a", Some(JobStatus::Failed))));
        assert!(!needs_sync(&record("a", Some(JobStatus::CompletedNoUrl))));
        assert!(!needs_sync(&record("a", Some(JobStatus::SourceTask))));
    }

    #[test]
    fn test_completed_needs_sync_when_file_missing() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let file = temp_dir.path().join("img.png");

        let mut completed = record("a", Some(JobStatus::Completed));
        assert!(needs_sync(&completed));

        completed.filepath = Some(file.to_string_lossy().into_owned());
        assert!(needs_sync(&completed));

        std::fs::write(&file, b"png").unwrap();
        assert!(!needs_sync(&completed));
    }

    #[test]
    fn test_looks_like_action_code() {
        assert!(looks_like_action_code("upsample1"));
        assert!(looks_like_action_code("variation3"));
        assert!(!looks_like_action_code("upsample1-0000000000000000000000"));
        assert!(!looks_like_action_code("3f2a9c1e-aaaa-bbbb-cccc-000000000000"));
    }

    #[test]
    fn test_ancestor_candidates() {
        let mut child = record("child", Some(JobStatus::Completed));
        child.original_job_id = Some("missing-parent-0000000000".to_string());
        let mut sibling = record("sibling", Some(JobStatus::Completed));
        sibling.original_job_id = Some("missing-parent-0000000000".to_string());
        let mut bogus = record("bogus", Some(JobStatus::Completed));
        bogus.original_job_id = Some("upsample2".to_string());
        let placeholder = record("holder", Some(JobStatus::SourcePollFailed));
        let handled = record("handled", Some(JobStatus::SourceSyncError));

        let records = vec![child, sibling, bogus, placeholder, handled];
        let processed = HashSet::from(["handled".to_string()]);
        let candidates = ancestor_candidates(&records, &processed);

        assert_eq!(
            candidates,
            vec![
                Candidate {
                    job_id: "missing-parent-0000000000".to_string(),
                    referenced_by: Some("child".to_string()),
                },
                Candidate {
                    job_id: "holder".to_string(),
                    referenced_by: None,
                },
            ]
        );
    }
}
