//! Source message → canonical record.

use std::collections::BTreeMap;

use crate::config::{FieldKind, MessageTypeRules, RuleTable};
use crate::error::RecordErrorKind;
use crate::model::{CanonicalRecord, FieldValue, IdentityKey, RawMessage, SourceMessage, SourceRecord, MESSAGE_TYPE};

/// Normalize a typed payment message.
pub fn normalize(message: &SourceMessage, rules: &RuleTable) -> Result<CanonicalRecord, RecordErrorKind> {
    normalize_fields(message.message_type(), &message.to_fields(), rules)
}

/// Normalize an untyped message.
pub fn normalize_raw(raw: &RawMessage, rules: &RuleTable) -> Result<CanonicalRecord, RecordErrorKind> {
    normalize_fields(&raw.message_type, &raw.fields, rules)
}

/// Map source-named fields to canonical names per the message type's rules.
///
/// Mandatory and core fields must be present, non-blank, and (when compared
/// as a decimal, date or timestamp) parseable. Optional fields that are
/// absent are left out of the record.
pub fn normalize_fields(
    message_type: &str,
    fields: &BTreeMap<String, FieldValue>,
    rules: &RuleTable,
) -> Result<CanonicalRecord, RecordErrorKind> {
    let type_rules = rules
        .get(message_type)
        .ok_or_else(|| RecordErrorKind::unsupported(message_type))?;

    let present = |name: &str| fields.get(name).filter(|v| !v.is_blank());

    for name in &type_rules.mandatory {
        if present(name.as_str()).is_none() {
            return Err(RecordErrorKind::malformed(name.as_str()));
        }
    }

    let mut record = CanonicalRecord::new();
    record.insert(MESSAGE_TYPE, message_type);

    for field in type_rules.plan() {
        if field.canonical == MESSAGE_TYPE {
            continue;
        }
        match present(field.source.as_str()) {
            Some(value) => {
                if field.required && !parses_as(value, field.kind) {
                    return Err(RecordErrorKind::malformed(field.source.as_str()));
                }
                record.insert(field.canonical.as_str(), value.clone());
            }
            None if field.required => return Err(RecordErrorKind::malformed(field.source.as_str())),
            None => {}
        }
    }

    Ok(record)
}

/// Check a record that arrived already in canonical form: core fields
/// present, and every mandatory field that is present parseable.
fn check_canonical(record: &CanonicalRecord, type_rules: &MessageTypeRules) -> Result<(), RecordErrorKind> {
    for field in type_rules.plan() {
        match record.get(&field.canonical) {
            Some(value) if field.required && !parses_as(value, field.kind) => {
                return Err(RecordErrorKind::malformed(field.canonical.as_str()));
            }
            None if field.core => return Err(RecordErrorKind::malformed(field.canonical.as_str())),
            _ => {}
        }
    }
    Ok(())
}

fn parses_as(value: &FieldValue, kind: Option<FieldKind>) -> bool {
    match kind {
        Some(FieldKind::Decimal) => value.to_decimal().is_some(),
        Some(FieldKind::Date) => value.to_date().is_some(),
        Some(FieldKind::Timestamp) => value.to_timestamp().is_some(),
        Some(FieldKind::Text) | None => true,
    }
}

/// Bring any source-feed entry to canonical form and resolve its identity.
///
/// Already-canonical records skip field mapping but must still carry an
/// identity, a message type the rule table knows, and the core fields.
pub fn prepare(
    record: &SourceRecord,
    rules: &RuleTable,
) -> Result<(IdentityKey, CanonicalRecord), RecordErrorKind> {
    let canonical = match record {
        SourceRecord::Message(m) => normalize(m, rules)?,
        SourceRecord::Raw(r) => normalize_raw(r, rules)?,
        SourceRecord::Canonical(c) => {
            let key = c.identity_key().map_err(RecordErrorKind::malformed)?;
            let type_rules = rules
                .get(&key.message_type)
                .ok_or_else(|| RecordErrorKind::unsupported(key.message_type.as_str()))?;
            check_canonical(c, type_rules)?;
            return Ok((key, c.clone()));
        }
    };

    let key = canonical.identity_key().map_err(RecordErrorKind::malformed)?;
    Ok((key, canonical))
}
