use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use serde::Deserialize;

use crate::error::EngineError;
use crate::model::{Severity, AMOUNT, CORE_FIELDS, CURRENCY, MESSAGE_TYPE, TRANSACTION_ID};

const BUILTIN_RULES: &str = include_str!("../rules/payments.rules.toml");

// ---------------------------------------------------------------------------
// Top-level rule table
// ---------------------------------------------------------------------------

/// Per message type: mandatory source fields, canonical name mapping, and
/// the ordered comparable-field list with severities.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleTable {
    pub name: String,
    #[serde(default)]
    pub message_types: BTreeMap<String, MessageTypeRules>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageTypeRules {
    /// Source field names that must be present and non-blank.
    #[serde(default)]
    pub mandatory: Vec<String>,
    /// `canonical_name = "source_name"`. Unlisted canonical fields use
    /// their own name in the source message.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Compared in this order.
    #[serde(default)]
    pub compare: Vec<CompareRule>,
    #[serde(skip)]
    plan: OnceLock<Vec<PlannedField>>,
}

/// A canonical field of one message type, resolved against its rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedField {
    pub canonical: String,
    /// Name of the field in the source message.
    pub source: String,
    /// Comparison kind, `None` when the field is carried but not compared.
    pub kind: Option<FieldKind>,
    /// One of the core fields every canonical record carries.
    pub core: bool,
    /// Core, or listed as mandatory: must be present and parse as `kind`.
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompareRule {
    pub field: String,
    #[serde(default)]
    pub kind: FieldKind,
    pub severity: Severity,
}

/// How two values of a field are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Parsed numeric value: "100.00" equals "100".
    Decimal,
    /// Calendar date, time-of-day ignored.
    Date,
    /// Full date-time, offsets normalized to UTC.
    Timestamp,
    /// Exact match after trimming surrounding whitespace.
    #[default]
    Text,
}

impl MessageTypeRules {
    /// Source field name for a canonical field.
    pub fn source_name<'a>(&'a self, canonical: &'a str) -> &'a str {
        self.fields.get(canonical).map(String::as_str).unwrap_or(canonical)
    }

    /// Canonical fields carried by records of this type, in a stable order:
    /// core fields, then compared fields, then any extra mapped fields.
    pub fn canonical_fields(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        let names = CORE_FIELDS
            .iter()
            .copied()
            .chain(self.compare.iter().map(|c| c.field.as_str()))
            .chain(self.fields.keys().map(String::as_str));
        for name in names {
            if seen.insert(name) {
                out.push(name);
            }
        }
        out
    }

    /// Resolved field list, built on first use and reused for every record.
    pub fn plan(&self) -> &[PlannedField] {
        self.plan.get_or_init(|| {
            self.canonical_fields()
                .into_iter()
                .map(|canonical| {
                    let source = self.source_name(canonical);
                    let core = CORE_FIELDS.contains(&canonical);
                    PlannedField {
                        canonical: canonical.to_string(),
                        source: source.to_string(),
                        kind: self.kind_of(canonical),
                        core,
                        required: core || self.mandatory.iter().any(|m| m == source),
                    }
                })
                .collect()
        })
    }

    /// Kind a canonical field is compared with, if it is compared at all.
    pub fn kind_of(&self, canonical: &str) -> Option<FieldKind> {
        self.compare
            .iter()
            .find(|c| c.field == canonical)
            .map(|c| c.kind)
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl RuleTable {
    pub fn from_toml(input: &str) -> Result<Self, EngineError> {
        let table: RuleTable =
            toml::from_str(input).map_err(|e| EngineError::RulesParse(e.to_string()))?;
        table.validate()?;
        Ok(table)
    }

    /// Shipped rules for pacs.008, pacs.009, MT103 and MT202.
    pub fn builtin() -> Result<Self, EngineError> {
        Self::from_toml(BUILTIN_RULES)
    }

    pub fn get(&self, message_type: &str) -> Option<&MessageTypeRules> {
        self.message_types.get(message_type)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.message_types.is_empty() {
            return Err(EngineError::EmptyRuleTable(self.name.clone()));
        }

        for (message_type, rules) in &self.message_types {
            let invalid = |reason: String| EngineError::InvalidRules {
                message_type: message_type.clone(),
                reason,
            };

            if rules.compare.is_empty() {
                return Err(invalid("no comparable fields".into()));
            }

            let id_source = rules.source_name(TRANSACTION_ID);
            if !rules.mandatory.iter().any(|f| f == id_source) {
                return Err(invalid(format!("'{id_source}' must be mandatory")));
            }

            if rules.fields.contains_key(MESSAGE_TYPE) {
                return Err(invalid("'message_type' cannot be remapped".into()));
            }

            match rules.compare.iter().find(|c| c.field == AMOUNT) {
                None => return Err(invalid(format!("'{AMOUNT}' must be compared"))),
                Some(rule) if rule.kind != FieldKind::Decimal => {
                    return Err(invalid(format!("'{AMOUNT}' must be compared as decimal")));
                }
                Some(_) => {}
            }
            if !rules.compare.iter().any(|c| c.field == CURRENCY) {
                return Err(invalid(format!("'{CURRENCY}' must be compared")));
            }

            let mut compared = BTreeSet::new();
            for rule in &rules.compare {
                if !compared.insert(rule.field.as_str()) {
                    return Err(invalid(format!("field '{}' compared twice", rule.field)));
                }
                if rule.field == TRANSACTION_ID || rule.field == MESSAGE_TYPE {
                    return Err(invalid(format!(
                        "identity field '{}' cannot be compared",
                        rule.field
                    )));
                }
                // Amount and currency mismatches are always HIGH.
                if (rule.field == AMOUNT || rule.field == CURRENCY) && rule.severity != Severity::High {
                    return Err(invalid(format!(
                        "field '{}' must have severity HIGH, got {}",
                        rule.field, rule.severity
                    )));
                }
            }

            rules.plan();
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
