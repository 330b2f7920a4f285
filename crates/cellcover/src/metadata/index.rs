//! In-memory lookup of records by job id.

use std::collections::HashMap;

use crate::metadata::record::JobRecord;

/// Map from `job_id` to record, built once per operation from a loaded
/// document.
#[derive(Debug, Clone, Default)]
pub struct MetadataIndex {
    by_id: HashMap<String, JobRecord>,
}

impl MetadataIndex {
    /// Builds the index. When a job id appears more than once the last
    /// occurrence wins and a warning is logged.
    pub fn build(records: &[JobRecord]) -> Self {
        let mut by_id = HashMap::with_capacity(records.len());
        for record in records {
            if record.job_id.is_empty() {
                continue;
            }
            if by_id.insert(record.job_id.clone(), record.clone()).is_some() {
                log::warn!(
                    "Duplicate job_id '{}' in metadata, keeping the last occurrence",
                    record.job_id
                );
            }
        }
        Self { by_id }
    }

    pub fn get(&self, job_id: &str) -> Option<&JobRecord> {
        self.by_id.get(job_id)
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.by_id.contains_key(job_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Adds or replaces a single record, e.g. after an upsert.
    pub fn insert(&mut self, record: JobRecord) {
        if !record.job_id.is_empty() {
            self.by_id.insert(record.job_id.clone(), record);
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &JobRecord> {
        self.by_id.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_job_id_keeps_last() {
        let mut first = JobRecord::new("dup");
        first.concept = Some("first".to_string());
        let mut second = JobRecord::new("dup");
        second.concept = Some("second".to_string());

        let index = MetadataIndex::build(&[first, second]);

        assert_eq!(index.len(), 1);
        assert_eq!(index.get("dup").unwrap().concept.as_deref(), Some("second"));
    }

    #[test]
    fn test_records_without_job_id_are_skipped() {
        let index = MetadataIndex::build(&[JobRecord::default(), JobRecord::new("a")]);
        assert_eq!(index.len(), 1);
        assert!(index.contains("a"));
    }
}
