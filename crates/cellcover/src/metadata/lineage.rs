//! Walks `original_job_id` links back to the root job.

use std::collections::HashSet;

use crate::metadata::index::MetadataIndex;
use crate::metadata::record::JobRecord;

/// Why a walk stopped before reaching a record without a parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainBreak {
    /// The named job is referenced but not present in the index.
    Missing(String),
    /// The named job was reached a second time.
    Cycle(String),
}

/// A root-first chain of records ending at the traced job.
#[derive(Debug, Clone, PartialEq)]
pub struct Lineage<'a> {
    pub chain: Vec<&'a JobRecord>,
    pub broken: Option<ChainBreak>,
}

impl<'a> Lineage<'a> {
    /// True when the first element has no parent.
    pub fn is_rooted(&self) -> bool {
        self.broken.is_none() && self.chain.first().is_some_and(|r| r.is_root())
    }

    /// Earliest record reached; the true root only when [`Self::is_rooted`].
    pub fn origin(&self) -> Option<&'a JobRecord> {
        self.chain.first().copied()
    }

    /// The true root, if the walk reached one.
    pub fn root(&self) -> Option<&'a JobRecord> {
        if self.is_rooted() {
            self.origin()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn job_ids(&self) -> Vec<&'a str> {
        self.chain.iter().map(|r| r.job_id.as_str()).collect()
    }
}

/// Traces `job_id` back to its root. The requested job is the last element;
/// a missing `job_id` yields an empty chain broken at that id.
pub fn trace<'a>(job_id: &str, index: &'a MetadataIndex) -> Lineage<'a> {
    let mut chain = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut current = job_id.to_string();

    let broken = loop {
        let Some(record) = index.get(&current) else {
            log::warn!("Lineage of {} is broken: {} is not in local metadata", job_id, current);
            break Some(ChainBreak::Missing(current));
        };

        if !visited.insert(record.job_id.as_str()) {
            log::warn!("Lineage of {} loops back to {}", job_id, current);
            break Some(ChainBreak::Cycle(current));
        }

        chain.push(record);

        match record.parent_id() {
            Some(parent) => current = parent.to_string(),
            None => break None,
        }
    };

    chain.reverse();
    Lineage { chain, broken }
}

/// Traces the ancestors of a record that may not be in the index yet,
/// starting at its `original_job_id`.
pub fn trace_ancestry<'a>(original_job_id: &str, index: &'a MetadataIndex) -> Lineage<'a> {
    trace(original_job_id, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(job_id: &str, parent: Option<&str>) -> JobRecord {
        let mut record = JobRecord::new(job_id);
        record.original_job_id = parent.map(str::to_string);
        record
    }

    #[test]
    fn test_trace_root_first() {
        let index = MetadataIndex::build(&[
            record("a", None),
            record("b", Some("a")),
            record("c", Some("b")),
        ]);

        let lineage = trace("c", &index);

        assert_eq!(lineage.job_ids(), vec!["a", "b", "c"]);
        assert!(lineage.is_rooted());
        assert_eq!(lineage.root().unwrap().job_id, "a");
    }

    #[test]
    fn test_trace_root_itself() {
        let index = MetadataIndex::build(&[record("a", None)]);
        let lineage = trace("a", &index);
        assert_eq!(lineage.job_ids(), vec!["a"]);
        assert!(lineage.is_rooted());
    }

    #[test]
    fn test_trace_dangling_reference_returns_partial_chain() {
        let index = MetadataIndex::build(&[record("b", Some("gone")), record("c", Some("b"))]);

        let lineage = trace("c", &index);

        assert_eq!(lineage.job_ids(), vec!["b", "c"]);
        assert_eq!(lineage.broken, Some(ChainBreak::Missing("gone".to_string())));
        assert!(!lineage.is_rooted());
        assert!(lineage.root().is_none());
        assert_eq!(lineage.origin().unwrap().job_id, "b");
        assert!(lineage.origin().unwrap().parent_id().is_some());
    }

    #[test]
    fn test_trace_cycle_terminates() {
        let index = MetadataIndex::build(&[
            record("x", Some("z")),
            record("y", Some("x")),
            record("z", Some("y")),
        ]);

        let lineage = trace("z", &index);

        assert_eq!(lineage.len(), 3);
        assert!(matches!(lineage.broken, Some(ChainBreak::Cycle(_))));
        assert!(!lineage.is_rooted());
    }

    #[test]
    fn test_trace_self_reference_terminates() {
        let index = MetadataIndex::build(&[record("s", Some("s"))]);
        let lineage = trace("s", &index);
        assert_eq!(lineage.len(), 1);
        assert_eq!(lineage.broken, Some(ChainBreak::Cycle("s".to_string())));
    }

    #[test]
    fn test_trace_unknown_job() {
        let index = MetadataIndex::default();
        let lineage = trace("nope", &index);
        assert!(lineage.is_empty());
        assert!(lineage.origin().is_none());
    }
}
