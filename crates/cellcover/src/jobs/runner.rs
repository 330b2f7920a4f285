use std::path::PathBuf;

use tracing::{error, info, info_span, warn};

use crate::config::VendorConfig;
use crate::error::{CellCoverError, Result};
use crate::metadata::{
    trace, JobRecord, JobStatus, MetadataIndex, MetadataStore, RecordUpdate, RECREATE_PREFIX,
};
use crate::state::StateFiles;
use crate::storage::ImageStorage;
use crate::sync::{complete_job, Completion};
use crate::vendor::{is_valid_action, BlendRequest, ImagineRequest, PollOutcome, VendorApi};

use super::blend::{encode_image, BlendParams, BLEND_CONCEPT};

/// Action code recorded for jobs regenerated from an earlier prompt.
pub const RECREATE_ACTION: &str = "recreate";

/// Creative tags attached to a new generation.
#[derive(Debug, Clone, Default)]
pub struct ImagineParams {
    pub prompt: String,
    pub concept: Option<String>,
    pub variations: Option<String>,
    pub global_styles: Option<String>,
}

impl ImagineParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

/// A job that finished with its image on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub record: JobRecord,
    pub path: PathBuf,
}

/// Submits jobs, waits for them and stores their images.
pub struct JobRunner<'a, V: VendorApi + ?Sized> {
    store: &'a MetadataStore,
    vendor: &'a V,
    images: &'a ImageStorage,
    state: &'a StateFiles,
    mode: Option<String>,
    hook_url: Option<String>,
}

impl<'a, V: VendorApi + ?Sized> JobRunner<'a, V> {
    pub fn new(
        store: &'a MetadataStore,
        vendor: &'a V,
        images: &'a ImageStorage,
        state: &'a StateFiles,
    ) -> Self {
        Self {
            store,
            vendor,
            images,
            state,
            mode: None,
            hook_url: None,
        }
    }

    /// Carries the configured generation mode and webhook into submissions.
    pub fn with_vendor_config(mut self, config: &VendorConfig) -> Self {
        self.mode = Some(config.mode.clone());
        self.hook_url = config.hook_url.clone();
        self
    }

    pub fn imagine(&self, params: ImagineParams) -> Result<JobOutcome> {
        let request = ImagineRequest {
            prompt: params.prompt.clone(),
            mode: self.mode.clone(),
            hook_url: self.hook_url.clone(),
        };
        let job_id = self.vendor.submit(&request)?;

        let mut initial = RecordUpdate::new().prompt(params.prompt);
        if let Some(concept) = params.concept {
            initial = initial.concept(concept);
        }
        initial.variations = params.variations.into();
        initial.global_styles = params.global_styles.into();

        self.track(&job_id, initial, None)
    }

    /// Combines 2 to 5 local images into a new root job filed under the
    /// `blend` concept.
    pub fn blend(&self, params: BlendParams) -> Result<JobOutcome> {
        params.validate()?;
        let images = params
            .images
            .iter()
            .map(|path| encode_image(path))
            .collect::<Result<Vec<_>>>()?;
        info!(images = images.len(), "Submitting blend");

        let request = BlendRequest {
            images,
            dimensions: params.dimensions,
            mode: self.mode.clone(),
            hook_url: self.hook_url.clone(),
        };
        let job_id = self.vendor.blend(&request)?;
        let initial = RecordUpdate::new()
            .prompt(params.prompt())
            .concept(BLEND_CONCEPT);

        self.track(&job_id, initial, None)
    }

    /// Applies `action_code` to the job named by `identifier`.
    pub fn action(&self, identifier: &str, action_code: &str) -> Result<JobOutcome> {
        if !is_valid_action(action_code) {
            return Err(CellCoverError::InvalidAction(action_code.to_string()));
        }
        let source = self.find(identifier)?;

        let job_id = self.vendor.action(&source.job_id, action_code)?;
        let mut initial = RecordUpdate::new().lineage(source.job_id.clone(), action_code);
        initial.prompt = source.prompt.clone().into();

        self.track(&job_id, initial, None)
    }

    /// Re-submits the root prompt of the job named by `identifier`. The new
    /// job is linked to it with the `recreate` action.
    pub fn recreate(&self, identifier: &str) -> Result<JobOutcome> {
        let source = self.find(identifier)?;
        let records = self.store.records();
        let index = MetadataIndex::build(&records);
        let lineage = trace(&source.job_id, &index);

        let prompt = lineage
            .root()
            .and_then(|root| root.prompt.clone())
            .or_else(|| source.prompt.clone())
            .ok_or_else(|| CellCoverError::MissingPrompt(source.job_id.clone()))?;

        let request = ImagineRequest {
            prompt: prompt.clone(),
            mode: self.mode.clone(),
            hook_url: self.hook_url.clone(),
        };
        let job_id = self.vendor.submit(&request)?;
        let initial = RecordUpdate::new()
            .prompt(prompt)
            .lineage(source.job_id.clone(), RECREATE_ACTION);

        self.track(&job_id, initial, Some(RECREATE_PREFIX))
    }

    /// Looks up a record by full id, 6-character prefix or filename.
    pub fn find(&self, identifier: &str) -> Result<JobRecord> {
        self.store.lookup(identifier)
    }

    fn track(
        &self,
        job_id: &str,
        initial: RecordUpdate,
        prefix: Option<&str>,
    ) -> Result<JobOutcome> {
        let _span = info_span!("job", job_id).entered();

        if let Err(e) = self.state.write_last_job_id(job_id) {
            error!("Failed to write state file: {}", e);
        }
        let record = self
            .store
            .upsert(job_id, initial.status(JobStatus::Submitted))?;
        info!("Waiting for job to finish");

        let data = match self.vendor.poll(job_id) {
            Ok(PollOutcome::Success(data)) => data,
            Ok(PollOutcome::Failed { message, .. }) => {
                warn!("Vendor reports job failed; removing record");
                self.store.remove(job_id)?;
                return Err(CellCoverError::JobIncomplete {
                    job_id: job_id.to_string(),
                    reason: message,
                });
            }
            Ok(PollOutcome::TimedOut) => {
                self.store
                    .upsert(job_id, RecordUpdate::new().status(JobStatus::PollingFailed))?;
                return Err(CellCoverError::JobIncomplete {
                    job_id: job_id.to_string(),
                    reason: "timed out waiting for the vendor; run sync later".to_string(),
                });
            }
            Err(e) => {
                self.store
                    .upsert(job_id, RecordUpdate::new().status(JobStatus::SyncError))?;
                return Err(e.into());
            }
        };

        match complete_job(self.store, self.vendor, self.images, &record, &data, prefix)? {
            Completion::Saved { record, path } => {
                if let Err(e) = self.state.write_last_succeed_job_id(job_id) {
                    error!("Failed to write state file: {}", e);
                }
                Ok(JobOutcome { record, path })
            }
            Completion::NoUrl(_) => Err(CellCoverError::JobIncomplete {
                job_id: job_id.to_string(),
                reason: "vendor returned no image URL".to_string(),
            }),
            Completion::DownloadFailed { reason, .. } => Err(CellCoverError::JobIncomplete {
                job_id: job_id.to_string(),
                reason,
            }),
        }
    }
}
