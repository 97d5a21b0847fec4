use serde::Serialize;
use thiserror::Error;

/// Structural failure. Aborts the run before any record is processed.
#[derive(Debug, Error)]
pub enum EngineError {
    /// TOML parse / deserialization error.
    #[error("rule table parse error: {0}")]
    RulesParse(String),
    /// The rule table defines no message types.
    #[error("rule table '{0}' defines no message types")]
    EmptyRuleTable(String),
    /// A message type's rules are internally inconsistent.
    #[error("rule table: message type '{message_type}': {reason}")]
    InvalidRules { message_type: String, reason: String },
}

/// Failure confined to a single record. The run continues.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum RecordErrorKind {
    #[error("unsupported message type '{message_type}'")]
    UnsupportedMessageType { message_type: String },
    #[error("malformed record: field '{field}' is missing or unparseable")]
    MalformedRecord { field: String },
}

impl RecordErrorKind {
    pub fn unsupported(message_type: impl Into<String>) -> Self {
        Self::UnsupportedMessageType {
            message_type: message_type.into(),
        }
    }

    pub fn malformed(field: impl Into<String>) -> Self {
        Self::MalformedRecord {
            field: field.into(),
        }
    }
}
