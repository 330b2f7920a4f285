//! Shared test utilities for cellcover integration tests.
//!
//! This module provides:
//! - `TestHarness` with isolated metadata, image and state directories
//! - Builders for job records and vendor payloads
//! - `ScriptedVendor`, an in-memory `VendorApi` with queued responses

pub mod builders;
pub mod harness;
pub mod vendor;

pub use builders::*;
pub use harness::TestHarness;
pub use vendor::{Scripted, ScriptedVendor};
