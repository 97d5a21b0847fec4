use crate::index::{IdentityIndex, TargetOccurrence};
use crate::model::IdentityKey;

/// Result of probing the target index for one source record.
#[derive(Debug, Clone, Copy)]
pub enum MatchOutcome<'a> {
    NotFound,
    MatchedUnique(TargetOccurrence<'a>),
    /// Two or more occurrences, in target-feed order.
    MatchedDuplicate(&'a [TargetOccurrence<'a>]),
}

impl<'a> MatchOutcome<'a> {
    /// Occurrence used for field differencing: the only one, or the first
    /// encountered among duplicates.
    pub fn primary(&self) -> Option<TargetOccurrence<'a>> {
        match self {
            Self::NotFound => None,
            Self::MatchedUnique(occ) => Some(*occ),
            Self::MatchedDuplicate(all) => all.first().copied(),
        }
    }

    pub fn occurrence_count(&self) -> usize {
        match self {
            Self::NotFound => 0,
            Self::MatchedUnique(_) => 1,
            Self::MatchedDuplicate(all) => all.len(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::MatchedUnique(_) => "matched_unique",
            Self::MatchedDuplicate(_) => "matched_duplicate",
        }
    }
}

/// Look a source identity up in the target index. Pure; safe to call from
/// many threads against the same index.
pub fn match_record<'a>(key: &IdentityKey, index: &'a IdentityIndex<'a>) -> MatchOutcome<'a> {
    match index.get(key) {
        None | Some([]) => MatchOutcome::NotFound,
        Some([only]) => MatchOutcome::MatchedUnique(*only),
        Some(all) => MatchOutcome::MatchedDuplicate(all),
    }
}
