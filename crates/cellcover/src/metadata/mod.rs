//! Local job metadata: records, the JSON store, lineage, normalization and
//! filename derivation.

pub mod filename;
pub mod index;
pub mod lineage;
pub mod normalize;
pub mod record;
pub mod store;

pub use filename::{derive_filename, sanitize_component, RECREATE_PREFIX};
pub use index::MetadataIndex;
pub use lineage::{trace, trace_ancestry, ChainBreak, Lineage};
pub use normalize::{normalize, normalize_all, normalize_record, NormalizeOptions, NormalizeReport};
pub use record::{FieldUpdate, JobRecord, JobStatus, RecordUpdate, Seed};
pub use store::{LoadOutcome, MetadataDocument, MetadataStore, Resolution};
