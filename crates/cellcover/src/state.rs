//! Small JSON files remembering the most recent jobs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StateError;

pub const LAST_JOB_FILENAME: &str = "last_job.json";
pub const LAST_SUCCEED_FILENAME: &str = "last_succeed.json";

#[derive(Debug, Serialize, Deserialize)]
struct LastJob {
    last_job_id: String,
}

pub struct StateFiles {
    state_directory: PathBuf,
}

impl StateFiles {
    pub fn new<P: AsRef<Path>>(state_directory: P) -> Self {
        Self {
            state_directory: state_directory.as_ref().to_path_buf(),
        }
    }

    /// Remembers the most recently submitted job.
    pub fn write_last_job_id(&self, job_id: &str) -> Result<(), StateError> {
        self.write(LAST_JOB_FILENAME, job_id)
    }

    pub fn read_last_job_id(&self) -> Result<Option<String>, StateError> {
        self.read(LAST_JOB_FILENAME)
    }

    /// Remembers the most recent job whose image was saved.
    pub fn write_last_succeed_job_id(&self, job_id: &str) -> Result<(), StateError> {
        self.write(LAST_SUCCEED_FILENAME, job_id)
    }

    pub fn read_last_succeed_job_id(&self) -> Result<Option<String>, StateError> {
        self.read(LAST_SUCCEED_FILENAME)
    }

    fn write(&self, name: &str, job_id: &str) -> Result<(), StateError> {
        let path = self.state_directory.join(name);
        std::fs::create_dir_all(&self.state_directory).map_err(|e| StateError::WriteFile {
            path: path.clone(),
            source: e,
        })?;

        let body = serde_json::to_string_pretty(&LastJob {
            last_job_id: job_id.to_string(),
        })
        .map_err(|e| StateError::Parse {
            path: path.clone(),
            source: e,
        })?;

        std::fs::write(&path, body).map_err(|e| StateError::WriteFile { path, source: e })
    }

    fn read(&self, name: &str) -> Result<Option<String>, StateError> {
        let path = self.state_directory.join(name);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path).map_err(|e| StateError::ReadFile {
            path: path.clone(),
            source: e,
        })?;
        let last: LastJob =
            serde_json::from_str(&content).map_err(|e| StateError::Parse { path, source: e })?;

        Ok(Some(last.last_job_id).filter(|id| !id.is_empty()))
    }
}
