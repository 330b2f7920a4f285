//! Test harness for isolated test execution.
//!
//! Every harness owns a temp directory laid out like a real install
//! (`metadata/`, `images/`, `state/`) and the components built on it.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use cellcover::metadata::JobRecord;
use cellcover::{AppConfig, ImageStorage, MetadataStore, StateFiles};

pub struct TestHarness {
    temp_dir: TempDir,
    pub config: AppConfig,
    pub store: MetadataStore,
    pub images: ImageStorage,
    pub state: StateFiles,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = AppConfig::with_base_dir(temp_dir.path());

        Self {
            store: MetadataStore::new(config.metadata_path()),
            images: ImageStorage::new(config.image_path()),
            state: StateFiles::new(config.state_path()),
            config,
            temp_dir,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn image_dir(&self) -> PathBuf {
        self.config.image_path()
    }

    /// Replaces the metadata file with `records`.
    pub fn seed(&self, records: &[JobRecord]) {
        self.store.save(records).expect("Failed to seed metadata");
    }

    /// Writes raw text as the metadata file.
    pub fn write_raw_metadata(&self, content: &str) {
        let dir = self.config.metadata_path();
        std::fs::create_dir_all(&dir).expect("Failed to create metadata dir");
        std::fs::write(self.store.path(), content).expect("Failed to write metadata file");
    }

    pub fn record(&self, job_id: &str) -> Option<JobRecord> {
        self.store.records().into_iter().find(|r| r.job_id == job_id)
    }

    /// Names of files in the image directory, sorted.
    pub fn image_files(&self) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(self.image_dir()) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    /// Files in the metadata directory other than the metadata file itself.
    pub fn metadata_backups(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.config.metadata_path())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.as_path() != self.store.path())
                    .collect()
            })
            .unwrap_or_default()
    }
}
