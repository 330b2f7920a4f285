//! Reconciling local records with the vendor.

pub mod artifact;
pub mod driver;
pub mod restore;

pub use artifact::{complete_job, merge_vendor_data, Completion};
pub use driver::{needs_sync, sync, SyncDriver, SyncReport};
pub use restore::{fetch_remote_jobs, restore_from_remote, RestoreOptions, RestoreReport};
