//! Reconciliation report: the serialized output of one run.
//!
//! The JSON encoding is consumed by dashboards reading historical reports:
//! fields may be added, never renamed or removed. Every collection is
//! ordered by source-feed position (or a total sort on top of it), so equal
//! inputs always encode to equal bytes.

use std::collections::BTreeMap;

use log::{debug, warn};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::diff::FieldDiscrepancy;
use crate::error::RecordErrorKind;
use crate::matcher::MatchOutcome;
use crate::model::{CanonicalRecord, FieldValue, IdentityKey, Severity, AMOUNT, CURRENCY, VALUE_DATE};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub meta: ReportMeta,
    pub status: RunStatus,
    pub summary: ReconSummary,
    pub missing: Vec<MissingEntry>,
    pub differing: Vec<DifferingEntry>,
    pub duplicated: Vec<DuplicatedEntry>,
    pub errors: Vec<RecordError>,
    pub advisories: Vec<Advisory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count_discrepancy: Option<CountDiscrepancy>,
    pub exceptions: Vec<ExceptionEntry>,
}

impl ReconciliationReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub engine_version: String,
    pub rule_table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every source record matched cleanly and the feed volumes agree.
    Clean,
    CompletedWithDiscrepancies,
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Source record with no target record sharing its identity key.
#[derive(Debug, Clone, Serialize)]
pub struct MissingEntry {
    pub source_index: usize,
    #[serde(flatten)]
    pub key: IdentityKey,
    pub amount: Option<FieldValue>,
    pub currency: Option<FieldValue>,
    pub value_date: Option<FieldValue>,
    pub severity: Severity,
    pub source: CanonicalRecord,
}

/// Matched record whose primary target occurrence differs field-by-field.
#[derive(Debug, Clone, Serialize)]
pub struct DifferingEntry {
    pub source_index: usize,
    #[serde(flatten)]
    pub key: IdentityKey,
    pub target_index: usize,
    /// Most severe of the field discrepancies.
    pub severity: Severity,
    /// The target side is the first of several duplicates.
    pub duplicate_primary: bool,
    pub discrepancies: Vec<FieldDiscrepancy>,
    pub source: CanonicalRecord,
    pub target: CanonicalRecord,
}

/// Source record whose identity key occurs two or more times in the target.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicatedEntry {
    pub source_index: usize,
    #[serde(flatten)]
    pub key: IdentityKey,
    pub occurrence_count: usize,
    pub target_indices: Vec<usize>,
    pub severity: Severity,
    pub source: CanonicalRecord,
    pub occurrences: Vec<CanonicalRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feed {
    Source,
    Target,
}

/// A record that could not be reconciled. The rest of the run is unaffected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordError {
    pub feed: Feed,
    pub index: usize,
    pub transaction_id: Option<String>,
    pub message_type: Option<String>,
    #[serde(flatten)]
    pub kind: RecordErrorKind,
    pub message: String,
}

/// Non-fatal anomaly. Every occurrence is still reconciled on its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    DuplicateIdentityInSource {
        #[serde(flatten)]
        key: IdentityKey,
        source_indices: Vec<usize>,
    },
}

/// Feed-level volume mismatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountDiscrepancy {
    pub source_count: usize,
    pub target_count: usize,
    pub difference: usize,
    /// Relative to the source count, two decimal places.
    pub percentage_difference: Decimal,
    pub more_in: Feed,
    pub severity: Severity,
}

// ---------------------------------------------------------------------------
// Exception list
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionCategory {
    MissingRecord,
    FieldMismatch,
    DuplicateRecord,
    CountDiscrepancy,
}

/// Flat, severity-sorted view over every discrepancy in the report.
#[derive(Debug, Clone, Serialize)]
pub struct ExceptionEntry {
    pub category: ExceptionCategory,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    pub description: String,
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    fn add(&mut self, severity: Severity) {
        match severity {
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.high + self.medium + self.low
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeComparison {
    pub source_total: usize,
    pub target_total: usize,
    pub volume_difference: usize,
    pub matched_clean: usize,
    pub unmatched: usize,
    /// Percentage of source records that matched cleanly, two decimal places.
    pub match_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconSummary {
    pub total_source_records: usize,
    pub total_target_records: usize,
    pub matched_clean: usize,
    pub missing: usize,
    pub differing: usize,
    pub duplicated: usize,
    pub source_errors: usize,
    pub target_errors: usize,
    pub source_duplicate_keys: usize,
    /// Field discrepancies by severity.
    pub by_severity: SeverityCounts,
    /// Field discrepancies by field name.
    pub by_field: BTreeMap<String, usize>,
    pub volume: VolumeComparison,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Accumulates per-record outcomes in source-feed order.
pub struct ReportBuilder {
    meta: ReportMeta,
    source_total: usize,
    target_total: usize,
    matched_clean: usize,
    by_severity: SeverityCounts,
    by_field: BTreeMap<String, usize>,
    missing: Vec<MissingEntry>,
    differing: Vec<DifferingEntry>,
    duplicated: Vec<DuplicatedEntry>,
    errors: Vec<RecordError>,
    advisories: Vec<Advisory>,
}

impl ReportBuilder {
    pub fn new(rule_table: &str, run_id: Option<String>, source_total: usize, target_total: usize) -> Self {
        Self {
            meta: ReportMeta {
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
                rule_table: rule_table.to_string(),
                run_id,
            },
            source_total,
            target_total,
            matched_clean: 0,
            by_severity: SeverityCounts::default(),
            by_field: BTreeMap::new(),
            missing: Vec::new(),
            differing: Vec::new(),
            duplicated: Vec::new(),
            errors: Vec::new(),
            advisories: Vec::new(),
        }
    }

    /// Record one source record's match outcome and its differ output.
    ///
    /// `discrepancies` is ignored for `NotFound`. A matched record with no
    /// discrepancies and a unique target is a clean match and leaves no
    /// entry behind.
    pub fn push_outcome(
        &mut self,
        source_index: usize,
        key: IdentityKey,
        source: &CanonicalRecord,
        outcome: &MatchOutcome<'_>,
        discrepancies: Vec<FieldDiscrepancy>,
    ) {
        debug!("{key}: {}", outcome.as_str());

        let primary = match outcome {
            MatchOutcome::NotFound => {
                warn!(
                    "MISSING RECORD: {key} | amount {} {}",
                    display_or_na(source.get(AMOUNT)),
                    display_or_na(source.get(CURRENCY))
                );
                self.missing.push(MissingEntry {
                    source_index,
                    amount: source.get(AMOUNT).cloned(),
                    currency: source.get(CURRENCY).cloned(),
                    value_date: source.get(VALUE_DATE).cloned(),
                    key,
                    severity: Severity::High,
                    source: source.clone(),
                });
                return;
            }
            MatchOutcome::MatchedUnique(occ) => *occ,
            MatchOutcome::MatchedDuplicate(all) => {
                let occurrence_count = outcome.occurrence_count();
                warn!("DUPLICATE RECORD: {key} | appears {occurrence_count} times in target");
                self.duplicated.push(DuplicatedEntry {
                    source_index,
                    key: key.clone(),
                    occurrence_count,
                    target_indices: all.iter().map(|o| o.index).collect(),
                    severity: Severity::High,
                    source: source.clone(),
                    occurrences: all.iter().map(|o| o.record.clone()).collect(),
                });
                all[0]
            }
        };

        let Some(severity) = Severity::worst(discrepancies.iter().map(|d| d.severity)) else {
            if matches!(outcome, MatchOutcome::MatchedUnique(_)) {
                self.matched_clean += 1;
            }
            return;
        };

        for d in &discrepancies {
            self.by_severity.add(d.severity);
            *self.by_field.entry(d.field.clone()).or_insert(0) += 1;
        }
        warn!(
            "UNMATCHED TRANSACTION: {key} | mismatched fields: {} | severity {severity}",
            field_list(&discrepancies)
        );

        self.differing.push(DifferingEntry {
            source_index,
            key,
            target_index: primary.index,
            severity,
            duplicate_primary: matches!(outcome, MatchOutcome::MatchedDuplicate(_)),
            discrepancies,
            source: source.clone(),
            target: primary.record.clone(),
        });
    }

    pub fn push_error(
        &mut self,
        feed: Feed,
        index: usize,
        transaction_id: Option<String>,
        message_type: Option<String>,
        kind: RecordErrorKind,
    ) {
        warn!(
            "RECORD ERROR: {feed:?} #{index} ({}) | {kind}",
            transaction_id.as_deref().unwrap_or("N/A")
        );
        self.errors.push(RecordError {
            feed,
            index,
            transaction_id,
            message_type,
            message: kind.to_string(),
            kind,
        });
    }

    pub fn push_advisory(&mut self, advisory: Advisory) {
        match &advisory {
            Advisory::DuplicateIdentityInSource { key, source_indices } => {
                warn!(
                    "DUPLICATE IDENTITY IN SOURCE: {key} | {} occurrences, each reconciled independently",
                    source_indices.len()
                );
            }
        }
        self.advisories.push(advisory);
    }

    pub fn finish(self) -> ReconciliationReport {
        let count_discrepancy = count_discrepancy(self.source_total, self.target_total);
        let exceptions = build_exceptions(
            &self.missing,
            &self.differing,
            &self.duplicated,
            count_discrepancy.as_ref(),
        );

        let source_errors = self.errors.iter().filter(|e| e.feed == Feed::Source).count();
        let target_errors = self.errors.len() - source_errors;

        let status = if exceptions.is_empty() && self.errors.is_empty() {
            RunStatus::Clean
        } else {
            RunStatus::CompletedWithDiscrepancies
        };

        let summary = ReconSummary {
            total_source_records: self.source_total,
            total_target_records: self.target_total,
            matched_clean: self.matched_clean,
            missing: self.missing.len(),
            differing: self.differing.len(),
            duplicated: self.duplicated.len(),
            source_errors,
            target_errors,
            source_duplicate_keys: self.advisories.len(),
            by_severity: self.by_severity,
            by_field: self.by_field,
            volume: volume_comparison(self.source_total, self.target_total, self.matched_clean),
        };

        ReconciliationReport {
            meta: self.meta,
            status,
            summary,
            missing: self.missing,
            differing: self.differing,
            duplicated: self.duplicated,
            errors: self.errors,
            advisories: self.advisories,
            count_discrepancy,
            exceptions,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn display_or_na(value: Option<&FieldValue>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "N/A".into())
}

fn field_list(discrepancies: &[FieldDiscrepancy]) -> String {
    discrepancies
        .iter()
        .map(|d| d.field.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `part / whole` as a percentage rounded to two places; `whole` floors at 1.
fn percentage(part: usize, whole: usize) -> Decimal {
    let whole = Decimal::from(whole.max(1));
    (Decimal::from(part) * Decimal::ONE_HUNDRED / whole).round_dp(2)
}

fn count_discrepancy(source_count: usize, target_count: usize) -> Option<CountDiscrepancy> {
    if source_count == target_count {
        return None;
    }
    let difference = source_count.abs_diff(target_count);
    let percentage_difference = percentage(difference, source_count);
    let severity = if percentage_difference > Decimal::TEN {
        Severity::High
    } else {
        Severity::Medium
    };
    Some(CountDiscrepancy {
        source_count,
        target_count,
        difference,
        percentage_difference,
        more_in: if source_count > target_count {
            Feed::Source
        } else {
            Feed::Target
        },
        severity,
    })
}

fn volume_comparison(source_total: usize, target_total: usize, matched_clean: usize) -> VolumeComparison {
    VolumeComparison {
        source_total,
        target_total,
        volume_difference: source_total.abs_diff(target_total),
        matched_clean,
        unmatched: source_total.saturating_sub(matched_clean),
        match_rate: percentage(matched_clean, source_total),
    }
}

fn build_exceptions(
    missing: &[MissingEntry],
    differing: &[DifferingEntry],
    duplicated: &[DuplicatedEntry],
    count: Option<&CountDiscrepancy>,
) -> Vec<ExceptionEntry> {
    let entry = |category, severity, source_index, key: &IdentityKey, description| ExceptionEntry {
        category,
        severity,
        source_index: Some(source_index),
        transaction_id: Some(key.transaction_id.clone()),
        message_type: Some(key.message_type.clone()),
        description,
    };

    let mut out: Vec<ExceptionEntry> = Vec::new();
    for m in missing {
        out.push(entry(
            ExceptionCategory::MissingRecord,
            m.severity,
            m.source_index,
            &m.key,
            format!("Transaction {} missing in target", m.key.transaction_id),
        ));
    }
    for d in differing {
        out.push(entry(
            ExceptionCategory::FieldMismatch,
            d.severity,
            d.source_index,
            &d.key,
            format!(
                "Transaction {} has {} field mismatch(es): {}",
                d.key.transaction_id,
                d.discrepancies.len(),
                field_list(&d.discrepancies)
            ),
        ));
    }
    for d in duplicated {
        out.push(entry(
            ExceptionCategory::DuplicateRecord,
            d.severity,
            d.source_index,
            &d.key,
            format!(
                "Transaction {} appears {} times in target",
                d.key.transaction_id, d.occurrence_count
            ),
        ));
    }
    if let Some(c) = count {
        out.push(ExceptionEntry {
            category: ExceptionCategory::CountDiscrepancy,
            severity: c.severity,
            source_index: None,
            transaction_id: None,
            message_type: None,
            description: format!(
                "Total count mismatch: {} source vs {} target ({}%)",
                c.source_count, c.target_count, c.percentage_difference
            ),
        });
    }

    // Severity first, then feed order; feed-level entries close their band.
    out.sort_by_key(|e| (e.severity, e.source_index.unwrap_or(usize::MAX), e.category));
    out
}
