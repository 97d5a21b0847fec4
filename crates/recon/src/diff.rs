// Field-level comparison of a source record against its matched target.
// Pure functions: two canonical records + one message type's rules in,
// ordered discrepancies out.

use serde::Serialize;

use crate::config::{FieldKind, MessageTypeRules};
use crate::model::{CanonicalRecord, FieldValue, Severity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDiscrepancy {
    pub field: String,
    /// `None` when the field is absent on that side.
    pub source_value: Option<FieldValue>,
    pub target_value: Option<FieldValue>,
    pub severity: Severity,
}

/// Compare every comparable field of the message type, in rule order.
///
/// A field absent on both sides is not a discrepancy; absent on one side
/// is. An empty result means the records match.
pub fn diff_records(
    source: &CanonicalRecord,
    target: &CanonicalRecord,
    rules: &MessageTypeRules,
) -> Vec<FieldDiscrepancy> {
    let mut discrepancies = Vec::new();

    for rule in &rules.compare {
        let source_value = source.get(&rule.field);
        let target_value = target.get(&rule.field);

        let equal = match (source_value, target_value) {
            (None, None) => true,
            (Some(s), Some(t)) => values_equal(rule.kind, s, t),
            _ => false,
        };

        if !equal {
            discrepancies.push(FieldDiscrepancy {
                field: rule.field.clone(),
                source_value: source_value.cloned(),
                target_value: target_value.cloned(),
                severity: rule.severity,
            });
        }
    }

    discrepancies
}

/// Type-aware equality. Values that do not parse as their declared kind
/// fall back to trimmed text comparison.
pub fn values_equal(kind: FieldKind, left: &FieldValue, right: &FieldValue) -> bool {
    let parsed = match kind {
        FieldKind::Decimal => both(left.to_decimal(), right.to_decimal()),
        FieldKind::Date => both(left.to_date(), right.to_date()),
        FieldKind::Timestamp => both(left.to_timestamp(), right.to_timestamp()),
        FieldKind::Text => None,
    };
    parsed.unwrap_or_else(|| text_equal(left, right))
}

fn both<T: PartialEq>(left: Option<T>, right: Option<T>) -> Option<bool> {
    match (left, right) {
        (Some(l), Some(r)) => Some(l == r),
        _ => None,
    }
}

fn text_equal(left: &FieldValue, right: &FieldValue) -> bool {
    left.to_string().trim() == right.to_string().trim()
}
