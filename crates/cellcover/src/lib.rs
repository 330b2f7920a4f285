pub mod config;
pub mod error;
pub mod jobs;
pub mod metadata;
pub mod sanitize;
pub mod secrets;
pub mod state;
pub mod storage;
pub mod sync;
pub mod vendor;

pub use config::{load_config, load_config_or_default, AppConfig, VendorConfig};
pub use error::{
    CellCoverError, ConfigError, Result, StateError, StorageError, StoreError, VendorError,
};
pub use jobs::{BlendParams, ImagineParams, JobOutcome, JobRunner};
pub use metadata::{
    derive_filename, normalize, normalize_all, trace, JobRecord, JobStatus, MetadataIndex,
    MetadataStore, NormalizeOptions, NormalizeReport, RecordUpdate,
};
pub use secrets::{resolve_secret, SecretError};
pub use state::StateFiles;
pub use storage::ImageStorage;
pub use sync::{
    fetch_remote_jobs, restore_from_remote, sync, RestoreOptions, RestoreReport, SyncDriver,
    SyncReport,
};
pub use vendor::{BlendDimensions, ImagineRequest, PollOutcome, TtapiClient, VendorApi};
