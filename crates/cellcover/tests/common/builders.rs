//! Builders for records and vendor payloads used across tests.

#![allow(dead_code)]

use serde_json::{json, Value};

use cellcover::metadata::{JobRecord, JobStatus};

/// A 36-character job id whose first six characters are `prefix`.
pub fn job_id(prefix: &str) -> String {
    let mut id = format!("{:0<8}-0000-4000-8000-000000000000", prefix);
    id.truncate(36);
    id
}

/// Builder for `JobRecord` test fixtures.
pub struct RecordBuilder {
    record: JobRecord,
}

impl RecordBuilder {
    /// A root job with the given concept.
    pub fn root(job_id: &str, concept: &str) -> Self {
        let mut record = JobRecord::new(job_id);
        record.concept = Some(concept.to_string());
        record.prompt = Some(format!("a {} prompt", concept));
        record.status = Some(JobStatus::Completed);
        Self { record }
    }

    /// A job derived from `original_job_id` by `action_code`.
    pub fn derived(job_id: &str, original_job_id: &str, action_code: &str) -> Self {
        let mut record = JobRecord::new(job_id);
        record.original_job_id = Some(original_job_id.to_string());
        record.action_code = Some(action_code.to_string());
        record.status = Some(JobStatus::Completed);
        Self { record }
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.record.status = Some(status);
        self
    }

    pub fn no_status(mut self) -> Self {
        self.record.status = None;
        self
    }

    pub fn url(mut self, url: &str) -> Self {
        self.record.url = Some(url.to_string());
        self
    }

    pub fn variations(mut self, tags: &str) -> Self {
        self.record.variations = Some(tags.to_string());
        self
    }

    pub fn global_styles(mut self, tags: &str) -> Self {
        self.record.global_styles = Some(tags.to_string());
        self
    }

    pub fn file(mut self, filename: &str, filepath: &str) -> Self {
        self.record.filename = Some(filename.to_string());
        self.record.filepath = Some(filepath.to_string());
        self
    }

    pub fn prompt(mut self, prompt: &str) -> Self {
        self.record.prompt = Some(prompt.to_string());
        self
    }

    pub fn build(self) -> JobRecord {
        self.record
    }
}

/// The `data` object of a successful `/fetch` response.
pub fn vendor_success(job_id: &str, cdn_image: Option<&str>) -> Value {
    let mut data = json!({
        "jobId": job_id,
        "prompt": "vendor prompt --ar 1:1",
        "seed": 1234,
        "progress": 100,
        "components": ["upsample1", "variation1"],
    });
    if let Some(url) = cdn_image {
        data["cdnImage"] = json!(url);
    }
    data
}

/// One entry of a `/list` page.
pub fn listed_job(job_id: &str, cdn_image: Option<&str>) -> Value {
    let mut job = json!({
        "jobId": job_id,
        "status": "SUCCESS",
        "prompt": "listed prompt",
    });
    if let Some(url) = cdn_image {
        job["cdnImage"] = json!(url);
    }
    job
}
