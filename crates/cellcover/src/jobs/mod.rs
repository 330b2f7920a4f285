//! Submitting new generations and actions and waiting for their images.

pub mod blend;
pub mod runner;

pub use blend::{BlendParams, BLEND_CONCEPT};
pub use runner::{ImagineParams, JobOutcome, JobRunner, RECREATE_ACTION};
