use std::path::PathBuf;

use rust_decimal::Decimal;
use screening_recon::report::{Advisory, ExceptionCategory, Feed, ReconciliationReport, RunStatus};
use screening_recon::{
    reconcile, reconcile_with, CanonicalRecord, EngineError, IdentityKey, RawMessage, RecordErrorKind, RuleTable,
    RunOptions, Severity, SourceMessage, SourceRecord,
};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_source() -> Vec<SourceRecord> {
    let path = fixtures_dir().join("source_messages.json");
    let data = std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    let messages: Vec<SourceMessage> = serde_json::from_str(&data).unwrap();
    messages.into_iter().map(SourceRecord::from).collect()
}

fn load_target() -> Vec<CanonicalRecord> {
    let path = fixtures_dir().join("screening_records.json");
    let data = std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    serde_json::from_str(&data).unwrap()
}

fn run_fixtures() -> ReconciliationReport {
    let rules = RuleTable::builtin().unwrap();
    reconcile(&load_source(), &load_target(), &rules).unwrap()
}

fn pacs008(id: &str, amount: &str) -> CanonicalRecord {
    CanonicalRecord::new()
        .with("transaction_id", id)
        .with("message_type", "pacs.008")
        .with("amount", amount)
        .with("currency", "USD")
        .with("value_date", "2026-01-15")
}

fn ids<'a>(keys: impl Iterator<Item = &'a IdentityKey>) -> Vec<&'a str> {
    keys.map(|k| k.transaction_id.as_str()).collect()
}

// -------------------------------------------------------------------------
// Fixture batch
// -------------------------------------------------------------------------

#[test]
fn fixture_batch_summary() {
    let report = run_fixtures();
    let s = &report.summary;

    assert_eq!(report.status, RunStatus::CompletedWithDiscrepancies);
    assert_eq!(s.total_source_records, 8);
    assert_eq!(s.total_target_records, 12);
    assert_eq!(s.matched_clean, 2);
    assert_eq!(s.missing, 1);
    assert_eq!(s.differing, 4);
    assert_eq!(s.duplicated, 2);
    assert_eq!(s.source_errors, 0);
    assert_eq!(s.target_errors, 1);
    assert_eq!(s.by_severity.high, 2);
    assert_eq!(s.by_severity.medium, 2);
    assert_eq!(s.by_severity.low, 0);
    assert_eq!(s.volume.match_rate, Decimal::new(2500, 2));
    assert_eq!(s.volume.unmatched, 6);
}

#[test]
fn fixture_batch_categories() {
    let report = run_fixtures();

    assert_eq!(ids(report.missing.iter().map(|e| &e.key)), vec!["TXN000002"]);
    assert_eq!(
        ids(report.differing.iter().map(|e| &e.key)),
        vec!["TXN000003", "TXN000004", "TXN000007", "TXN000008"]
    );
    assert_eq!(ids(report.duplicated.iter().map(|e| &e.key)), vec!["TXN000004", "TXN000006"]);

    let tx4 = &report.duplicated[0];
    assert_eq!(tx4.occurrence_count, 2);
    assert_eq!(tx4.target_indices, vec![2, 4]);

    let tx6 = &report.duplicated[1];
    assert_eq!(tx6.occurrence_count, 3);
    assert_eq!(tx6.target_indices, vec![5, 6, 7]);

    let fields: Vec<(&str, &str, Severity)> = report
        .differing
        .iter()
        .flat_map(|d| {
            d.discrepancies
                .iter()
                .map(move |f| (d.key.transaction_id.as_str(), f.field.as_str(), f.severity))
        })
        .collect();
    assert_eq!(
        fields,
        vec![
            ("TXN000003", "amount", Severity::High),
            ("TXN000004", "beneficiary_customer", Severity::Medium),
            ("TXN000007", "currency", Severity::High),
            ("TXN000008", "creditor_name", Severity::Medium),
        ]
    );
    assert!(report.differing[1].duplicate_primary);
    assert_eq!(report.differing[1].target_index, 2);
}

#[test]
fn fixture_batch_target_error_and_count() {
    let report = run_fixtures();

    assert_eq!(report.errors.len(), 1);
    let err = &report.errors[0];
    assert_eq!(err.feed, Feed::Target);
    assert_eq!(err.index, 11);
    assert_eq!(err.transaction_id.as_deref(), Some("TXN000100"));
    assert_eq!(err.kind, RecordErrorKind::malformed("message_type"));

    let count = report.count_discrepancy.as_ref().unwrap();
    assert_eq!(count.difference, 4);
    assert_eq!(count.percentage_difference, Decimal::new(5000, 2));
    assert_eq!(count.more_in, Feed::Target);
    assert_eq!(count.severity, Severity::High);
}

#[test]
fn fixture_batch_exception_order() {
    let report = run_fixtures();
    let order: Vec<_> = report
        .exceptions
        .iter()
        .map(|e| (e.severity, e.category, e.transaction_id.as_deref()))
        .collect();
    assert_eq!(
        order,
        vec![
            (Severity::High, ExceptionCategory::MissingRecord, Some("TXN000002")),
            (Severity::High, ExceptionCategory::FieldMismatch, Some("TXN000003")),
            (Severity::High, ExceptionCategory::DuplicateRecord, Some("TXN000004")),
            (Severity::High, ExceptionCategory::DuplicateRecord, Some("TXN000006")),
            (Severity::High, ExceptionCategory::FieldMismatch, Some("TXN000007")),
            (Severity::High, ExceptionCategory::CountDiscrepancy, None),
            (Severity::Medium, ExceptionCategory::FieldMismatch, Some("TXN000004")),
            (Severity::Medium, ExceptionCategory::FieldMismatch, Some("TXN000008")),
        ]
    );
}

#[test]
fn fixture_batch_is_complete() {
    let report = run_fixtures();
    let s = &report.summary;
    let differing_only = report.differing.iter().filter(|d| !d.duplicate_primary).count();
    assert_eq!(
        s.matched_clean + s.missing + differing_only + s.duplicated + s.source_errors,
        s.total_source_records
    );
}

// -------------------------------------------------------------------------
// Determinism
// -------------------------------------------------------------------------

#[test]
fn identical_inputs_give_byte_identical_json() {
    let first = run_fixtures().to_json().unwrap();
    let second = run_fixtures().to_json().unwrap();
    assert_eq!(first, second);
}

#[test]
fn report_json_shape() {
    let rules = RuleTable::builtin().unwrap();
    let options = RunOptions {
        run_id: Some("RUN-7".into()),
    };
    let report = reconcile_with(&load_source(), &load_target(), &rules, &options).unwrap();
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    assert_eq!(json["status"], "completed_with_discrepancies");
    assert_eq!(json["meta"]["run_id"], "RUN-7");
    assert_eq!(json["meta"]["rule_table"], "payments");
    assert_eq!(json["missing"][0]["transaction_id"], "TXN000002");
    assert_eq!(json["missing"][0]["message_type"], "pacs.008");
    assert_eq!(json["differing"][0]["severity"], "HIGH");
    assert_eq!(json["duplicated"][1]["occurrence_count"], 3);
    assert_eq!(json["errors"][0]["feed"], "target");
    assert_eq!(json["errors"][0]["error"], "malformed_record");
    assert_eq!(json["count_discrepancy"]["more_in"], "target");
    assert!(json["summary"]["by_field"].is_object());
}

// -------------------------------------------------------------------------
// Scenarios
// -------------------------------------------------------------------------

#[test]
fn scenario_missing_record() {
    let rules = RuleTable::builtin().unwrap();
    let source = vec![SourceRecord::from(pacs008("TX1", "100.00"))];
    let report = reconcile(&source, &[], &rules).unwrap();

    assert_eq!(report.missing.len(), 1);
    assert_eq!(report.missing[0].key, IdentityKey::new("TX1", "pacs.008"));
    assert_eq!(report.missing[0].severity, Severity::High);
    assert!(report.differing.is_empty());
    assert!(report.duplicated.is_empty());
    assert_eq!(report.summary.matched_clean, 0);
}

#[test]
fn scenario_amount_off_by_one_cent() {
    let rules = RuleTable::builtin().unwrap();
    let source = vec![SourceRecord::from(pacs008("TX2", "100.00"))];
    let target = vec![pacs008("TX2", "100.01")];
    let report = reconcile(&source, &target, &rules).unwrap();

    assert_eq!(report.differing.len(), 1);
    let discrepancies = &report.differing[0].discrepancies;
    assert_eq!(discrepancies.len(), 1);
    assert_eq!(discrepancies[0].field, "amount");
    assert_eq!(discrepancies[0].severity, Severity::High);
    assert!(report.missing.is_empty());
    assert!(report.duplicated.is_empty());
}

#[test]
fn scenario_duplicate_in_target() {
    let rules = RuleTable::builtin().unwrap();
    let source = vec![SourceRecord::from(pacs008("TX3", "50.00"))];

    let target = vec![pacs008("TX3", "50.00"), pacs008("TX3", "50.00")];
    let report = reconcile(&source, &target, &rules).unwrap();
    assert_eq!(report.duplicated.len(), 1);
    assert_eq!(report.duplicated[0].occurrence_count, 2);
    assert!(report.differing.is_empty());

    // Primary occurrence differs: reported in both collections.
    let target = vec![pacs008("TX3", "55.00"), pacs008("TX3", "50.00")];
    let report = reconcile(&source, &target, &rules).unwrap();
    assert_eq!(report.duplicated.len(), 1);
    assert_eq!(report.differing.len(), 1);
    assert_eq!(report.differing[0].target_index, 0);
    assert!(report.differing[0].duplicate_primary);
}

#[test]
fn scenario_identical_records_match_clean() {
    let rules = RuleTable::builtin().unwrap();
    let record = pacs008("TX4", "100.00")
        .with("value_date", "2026-01-15")
        .with("debtor_name", "Global Trading Ltd");
    let source = vec![SourceRecord::from(record.clone())];
    let report = reconcile(&source, &[record], &rules).unwrap();

    assert!(report.missing.is_empty());
    assert!(report.differing.is_empty());
    assert!(report.duplicated.is_empty());
    assert_eq!(report.summary.matched_clean, 1);
    assert_eq!(report.status, RunStatus::Clean);
}

// -------------------------------------------------------------------------
// Rules & errors
// -------------------------------------------------------------------------

#[test]
fn amount_and_currency_are_high_for_every_type() {
    let rules = RuleTable::builtin().unwrap();
    for (message_type, type_rules) in &rules.message_types {
        for rule in &type_rules.compare {
            if rule.field == "amount" || rule.field == "currency" {
                assert_eq!(rule.severity, Severity::High, "{message_type}.{}", rule.field);
            }
        }

        let base = CanonicalRecord::new()
            .with("transaction_id", "TX")
            .with("message_type", message_type.as_str())
            .with("amount", "10.00")
            .with("currency", "EUR")
            .with("value_date", "2026-01-15");
        let changed = base.clone().with("amount", "10.50").with("currency", "USD");
        let report = reconcile(&[SourceRecord::from(base)], &[changed], &rules).unwrap();
        assert_eq!(report.differing[0].discrepancies.len(), 2, "{message_type}");
        assert!(report.differing[0]
            .discrepancies
            .iter()
            .all(|d| d.severity == Severity::High));
    }
}

#[test]
fn rule_table_driven_message_type() {
    let rules = RuleTable::from_toml(
        r#"
name = "camt"

[message_types."camt.054"]
mandatory = ["transaction_id", "amt", "ccy"]

[message_types."camt.054".fields]
amount = "amt"
currency = "ccy"

[[message_types."camt.054".compare]]
field = "amount"
kind = "decimal"
severity = "high"

[[message_types."camt.054".compare]]
field = "currency"
severity = "high"

[[message_types."camt.054".compare]]
field = "booking_date"
kind = "date"
severity = "low"
"#,
    )
    .unwrap();

    let source = vec![
        SourceRecord::from(
            RawMessage::new("camt.054")
                .with("transaction_id", "C1")
                .with("amt", "12.5")
                .with("ccy", "EUR")
                .with("value_date", "2026-01-15")
                .with("booking_date", "2026-01-15"),
        ),
        SourceRecord::from(RawMessage::new("camt.054").with("transaction_id", "C2").with("ccy", "EUR")),
    ];
    let target = vec![CanonicalRecord::new()
        .with("transaction_id", "C1")
        .with("message_type", "camt.054")
        .with("amount", "12.50")
        .with("currency", "EUR")
        .with("value_date", "2026-01-15")
        .with("booking_date", "2026-01-16")];

    let report = reconcile(&source, &target, &rules).unwrap();
    assert_eq!(report.differing.len(), 1);
    assert_eq!(report.differing[0].discrepancies[0].field, "booking_date");
    assert_eq!(report.differing[0].severity, Severity::Low);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, RecordErrorKind::malformed("amt"));
    assert_eq!(report.errors[0].transaction_id.as_deref(), Some("C2"));
}

#[test]
fn unsupported_type_reported_and_batch_continues() {
    let rules = RuleTable::builtin().unwrap();
    let source = vec![
        SourceRecord::from(RawMessage::new("pacs.004").with("transaction_id", "R1")),
        SourceRecord::from(pacs008("TX1", "1.00")),
    ];
    let report = reconcile(&source, &[pacs008("TX1", "1.00")], &rules).unwrap();

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, RecordErrorKind::unsupported("pacs.004"));
    assert_eq!(report.errors[0].index, 0);
    assert_eq!(report.summary.matched_clean, 1);
}

#[test]
fn source_duplicates_processed_independently() {
    let rules = RuleTable::builtin().unwrap();
    let source = vec![
        SourceRecord::from(pacs008("TX1", "1.00")),
        SourceRecord::from(pacs008("TX1", "2.00")),
    ];
    let report = reconcile(&source, &[pacs008("TX1", "1.00")], &rules).unwrap();

    assert_eq!(report.summary.matched_clean, 1);
    assert_eq!(report.differing.len(), 1);
    assert_eq!(report.differing[0].source_index, 1);
    assert_eq!(report.summary.source_duplicate_keys, 1);
    let Advisory::DuplicateIdentityInSource { source_indices, .. } = &report.advisories[0];
    assert_eq!(source_indices, &vec![0, 1]);
}

#[test]
fn rule_table_must_compare_amount_and_currency() {
    let without_currency = r#"
name = "partial"

[message_types."MT910"]
mandatory = ["transaction_id", "amount"]

[[message_types."MT910".compare]]
field = "amount"
kind = "decimal"
severity = "high"
"#;
    let err = RuleTable::from_toml(without_currency).unwrap_err();
    assert!(matches!(err, EngineError::InvalidRules { .. }), "{err}");

    let text_amount = r#"
name = "partial"

[message_types."MT910"]
mandatory = ["transaction_id", "amount"]

[[message_types."MT910".compare]]
field = "amount"
kind = "text"
severity = "high"

[[message_types."MT910".compare]]
field = "currency"
severity = "high"
"#;
    let err = RuleTable::from_toml(text_amount).unwrap_err();
    assert!(err.to_string().contains("must be compared as decimal"));
}

#[test]
fn canonical_source_without_core_fields_is_an_error() {
    let rules = RuleTable::builtin().unwrap();
    let incomplete = CanonicalRecord::new()
        .with("transaction_id", "TX2")
        .with("message_type", "MT103")
        .with("amount", "10.00");
    let source = vec![SourceRecord::from(incomplete)];
    let report = reconcile(&source, &[], &rules).unwrap();

    assert!(report.missing.is_empty());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].feed, Feed::Source);
    assert_eq!(report.errors[0].kind, RecordErrorKind::malformed("currency"));
    assert_eq!(report.errors[0].transaction_id.as_deref(), Some("TX2"));
}
