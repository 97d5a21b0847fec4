use std::collections::HashMap;

use crate::error::RecordErrorKind;
use crate::model::{CanonicalRecord, IdentityKey};

/// A target record together with its position in the target feed.
#[derive(Debug, Clone, Copy)]
pub struct TargetOccurrence<'a> {
    pub index: usize,
    pub record: &'a CanonicalRecord,
}

/// Identity key → target occurrences, in feed order.
///
/// Built once per run and read-only afterwards, so it can be shared across
/// matcher threads without locking.
#[derive(Debug)]
pub struct IdentityIndex<'a> {
    entries: HashMap<IdentityKey, Vec<TargetOccurrence<'a>>>,
    rejected: Vec<(usize, RecordErrorKind)>,
    indexed: usize,
}

impl<'a> IdentityIndex<'a> {
    /// Group target records by identity key. Each record is visited once.
    ///
    /// Records without a transaction id or message type cannot be paired
    /// with anything; they are set aside in `rejected()`.
    pub fn build(target: &'a [CanonicalRecord]) -> Self {
        let mut entries: HashMap<IdentityKey, Vec<TargetOccurrence<'a>>> =
            HashMap::with_capacity(target.len());
        let mut rejected = Vec::new();
        let mut indexed = 0;

        for (index, record) in target.iter().enumerate() {
            match record.identity_key() {
                Ok(key) => {
                    entries
                        .entry(key)
                        .or_default()
                        .push(TargetOccurrence { index, record });
                    indexed += 1;
                }
                Err(field) => rejected.push((index, RecordErrorKind::malformed(field))),
            }
        }

        Self {
            entries,
            rejected,
            indexed,
        }
    }

    pub fn get(&self, key: &IdentityKey) -> Option<&[TargetOccurrence<'a>]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Number of distinct identity keys.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of target records that were indexed.
    pub fn indexed_records(&self) -> usize {
        self.indexed
    }

    /// Target records that could not be indexed, in feed order.
    pub fn rejected(&self) -> &[(usize, RecordErrorKind)] {
        &self.rejected
    }

    /// Keys that occur more than once in the target feed, sorted.
    pub fn duplicate_keys(&self) -> Vec<(&IdentityKey, usize)> {
        let mut dups: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, occ)| occ.len() > 1)
            .map(|(key, occ)| (key, occ.len()))
            .collect();
        dups.sort();
        dups
    }
}
