//! In-memory vendor client with scripted responses.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde_json::Value;

use cellcover::vendor::{BlendRequest, ImagineRequest, PollOutcome, VendorApi};
use cellcover::VendorError;

/// One scripted answer to a `poll` call.
#[derive(Debug, Clone)]
pub enum Scripted {
    Outcome(PollOutcome),
    /// Returned as `VendorError::Rejected`.
    Error(String),
}

#[derive(Default)]
pub struct ScriptedVendor {
    polls: Mutex<HashMap<String, VecDeque<Scripted>>>,
    details: Mutex<HashMap<String, Value>>,
    downloads: Mutex<HashMap<String, Result<Vec<u8>, String>>>,
    pages: Mutex<Vec<Vec<Value>>>,
    submit_ids: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedVendor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_poll(self, job_id: &str, answer: Scripted) -> Self {
        self.polls
            .lock()
            .unwrap()
            .entry(job_id.to_string())
            .or_default()
            .push_back(answer);
        self
    }

    pub fn poll_success(self, job_id: &str, data: Value) -> Self {
        self.on_poll(job_id, Scripted::Outcome(PollOutcome::Success(data)))
    }

    pub fn poll_failed(self, job_id: &str, message: &str) -> Self {
        self.on_poll(
            job_id,
            Scripted::Outcome(PollOutcome::Failed {
                message: message.to_string(),
                payload: Value::Null,
            }),
        )
    }

    pub fn poll_timeout(self, job_id: &str) -> Self {
        self.on_poll(job_id, Scripted::Outcome(PollOutcome::TimedOut))
    }

    pub fn poll_error(self, job_id: &str, message: &str) -> Self {
        self.on_poll(job_id, Scripted::Error(message.to_string()))
    }

    pub fn image(self, url: &str, bytes: &[u8]) -> Self {
        self.downloads
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(bytes.to_vec()));
        self
    }

    pub fn broken_image(self, url: &str, reason: &str) -> Self {
        self.downloads
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(reason.to_string()));
        self
    }

    pub fn detail(self, job_id: &str, data: Value) -> Self {
        self.details.lock().unwrap().insert(job_id.to_string(), data);
        self
    }

    pub fn page(self, jobs: Vec<Value>) -> Self {
        self.pages.lock().unwrap().push(jobs);
        self
    }

    /// Queues the id returned by the next `submit` or `action`.
    pub fn next_job_id(self, job_id: &str) -> Self {
        self.submit_ids.lock().unwrap().push_back(job_id.to_string());
        self
    }

    /// Every call made so far, as `method:argument`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn polled(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix("poll:").map(str::to_string))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn rejected(endpoint: &str, message: &str) -> VendorError {
        VendorError::Rejected {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        }
    }

    fn take_job_id(&self, endpoint: &str) -> Result<String, VendorError> {
        self.submit_ids
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Self::rejected(endpoint, "no scripted job id"))
    }
}

impl VendorApi for ScriptedVendor {
    fn submit(&self, request: &ImagineRequest) -> Result<String, VendorError> {
        self.record(format!("submit:{}", request.prompt));
        self.take_job_id("imagine")
    }

    fn poll(&self, job_id: &str) -> Result<PollOutcome, VendorError> {
        self.record(format!("poll:{}", job_id));
        let answer = self
            .polls
            .lock()
            .unwrap()
            .get_mut(job_id)
            .and_then(VecDeque::pop_front);

        match answer {
            Some(Scripted::Outcome(outcome)) => Ok(outcome),
            Some(Scripted::Error(message)) => Err(Self::rejected("fetch", &message)),
            None => Err(Self::rejected("fetch", "no scripted poll response")),
        }
    }

    fn fetch(&self, job_id: &str) -> Result<Value, VendorError> {
        self.record(format!("fetch:{}", job_id));
        self.details
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .ok_or_else(|| Self::rejected("fetch", "unknown job"))
    }

    fn list(&self, page: u32, limit: u32) -> Result<Vec<Value>, VendorError> {
        self.record(format!("list:{}", page));
        let pages = self.pages.lock().unwrap();
        Ok(pages
            .get(page.saturating_sub(1) as usize)
            .map(|jobs| jobs.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    fn blend(&self, request: &BlendRequest) -> Result<String, VendorError> {
        self.record(format!("blend:{}", request.images.len()));
        for image in &request.images {
            self.record(format!("blend_image:{}", image));
        }
        self.take_job_id("blend")
    }

    fn action(&self, job_id: &str, action_code: &str) -> Result<String, VendorError> {
        self.record(format!("action:{}:{}", job_id, action_code));
        self.take_job_id("action")
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, VendorError> {
        self.record(format!("download:{}", url));
        match self.downloads.lock().unwrap().get(url) {
            Some(Ok(bytes)) => Ok(bytes.clone()),
            Some(Err(reason)) => Err(VendorError::Download {
                url: url.to_string(),
                reason: reason.clone(),
            }),
            None => Err(VendorError::Download {
                url: url.to_string(),
                reason: "not scripted".to_string(),
            }),
        }
    }
}
