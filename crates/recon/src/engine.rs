use std::collections::HashMap;

use log::info;

use crate::diff::diff_records;
use crate::config::RuleTable;
use crate::error::EngineError;
use crate::index::IdentityIndex;
use crate::matcher::match_record;
use crate::model::{CanonicalRecord, IdentityKey, SourceRecord};
use crate::normalize::prepare;
use crate::report::{Advisory, Feed, ReconciliationReport, ReportBuilder};

/// Caller-supplied settings that do not affect matching.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Copied into `report.meta.run_id`.
    pub run_id: Option<String>,
}

/// Reconcile the source feed against the target feed with default options.
pub fn reconcile(
    source: &[SourceRecord],
    target: &[CanonicalRecord],
    rules: &RuleTable,
) -> Result<ReconciliationReport, EngineError> {
    reconcile_with(source, target, rules, &RunOptions::default())
}

/// Reconcile the source feed against the target feed.
///
/// Fails only on a structurally invalid rule table. Problems with individual
/// records end up in `report.errors` and the rest of the batch proceeds.
pub fn reconcile_with(
    source: &[SourceRecord],
    target: &[CanonicalRecord],
    rules: &RuleTable,
    options: &RunOptions,
) -> Result<ReconciliationReport, EngineError> {
    rules.validate()?;

    info!(
        "Starting reconciliation '{}': {} source records, {} target records",
        rules.name,
        source.len(),
        target.len()
    );

    let index = IdentityIndex::build(target);
    info!(
        "Indexed {} target records under {} identity keys ({} duplicated)",
        index.indexed_records(),
        index.key_count(),
        index.duplicate_keys().len()
    );
    let mut builder = ReportBuilder::new(&rules.name, options.run_id.clone(), source.len(), target.len());

    for (index_pos, kind) in index.rejected() {
        let record = &target[*index_pos];
        builder.push_error(
            Feed::Target,
            *index_pos,
            record.transaction_id(),
            record.message_type(),
            kind.clone(),
        );
    }

    // Source-side key repeats, in first-seen order.
    let mut seen: HashMap<IdentityKey, usize> = HashMap::new();
    let mut repeats: Vec<(IdentityKey, Vec<usize>)> = Vec::new();

    for (source_index, record) in source.iter().enumerate() {
        let (key, canonical) = match prepare(record, rules) {
            Ok(prepared) => prepared,
            Err(kind) => {
                builder.push_error(
                    Feed::Source,
                    source_index,
                    record.transaction_id(),
                    record.message_type(),
                    kind,
                );
                continue;
            }
        };

        match seen.get(&key) {
            Some(&slot) => repeats[slot].1.push(source_index),
            None => {
                seen.insert(key.clone(), repeats.len());
                repeats.push((key.clone(), vec![source_index]));
            }
        }

        let outcome = match_record(&key, &index);
        let discrepancies = match (outcome.primary(), rules.get(&key.message_type)) {
            (Some(primary), Some(type_rules)) => diff_records(&canonical, primary.record, type_rules),
            _ => Vec::new(),
        };
        builder.push_outcome(source_index, key, &canonical, &outcome, discrepancies);
    }

    for (key, source_indices) in repeats {
        if source_indices.len() > 1 {
            builder.push_advisory(Advisory::DuplicateIdentityInSource { key, source_indices });
        }
    }

    let report = builder.finish();
    let s = &report.summary;
    info!(
        "Reconciliation '{}' complete: {} matched clean, {} missing, {} differing ({} field discrepancies), {} duplicated, {} errors, match rate {}%",
        rules.name,
        s.matched_clean,
        s.missing,
        s.differing,
        s.by_severity.total(),
        s.duplicated,
        s.source_errors + s.target_errors,
        s.volume.match_rate
    );

    Ok(report)
}
