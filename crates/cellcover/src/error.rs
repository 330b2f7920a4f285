use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CellCoverError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Metadata store error: {0}")]
    Store(#[from] StoreError),

    #[error("Vendor API error: {0}")]
    Vendor(#[from] VendorError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("State file error: {0}")]
    State(#[from] StateError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Identifier '{identifier}' is ambiguous ({count} matches)")]
    AmbiguousIdentifier { identifier: String, count: usize },

    #[error("Invalid action '{0}'")]
    InvalidAction(String),

    #[error("A blend needs 2 to 5 images, got {0}")]
    BlendImageCount(usize),

    #[error("Failed to read image '{path}': {source}")]
    ReadImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No prompt recorded for job {0} or its lineage")]
    MissingPrompt(String),

    #[error("Job {job_id} did not produce an image: {reason}")]
    JobIncomplete { job_id: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("No home directory available to derive default paths")]
    NoHomeDirectory,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read metadata file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write metadata file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to replace '{to}' with '{from}': {source}")]
    Replace {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to back up metadata file '{path}': {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize metadata: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Metadata file was corrupt; its contents were moved to '{backup}'")]
    Corrupt { backup: PathBuf },
}

#[derive(Error, Debug)]
pub enum VendorError {
    #[error("HTTP request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Vendor rejected request to {endpoint}: {message}")]
    Rejected { endpoint: String, message: String },

    #[error("Unexpected response from {endpoint}: {reason}")]
    UnexpectedResponse { endpoint: String, reason: String },

    #[error("Failed to download '{url}': {reason}")]
    Download { url: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File already exists: {0}")]
    FileExists(PathBuf),
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to read state file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write state file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed state file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, CellCoverError>;
