use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};

pub const TRANSACTION_ID: &str = "transaction_id";
pub const MESSAGE_TYPE: &str = "message_type";
pub const AMOUNT: &str = "amount";
pub const CURRENCY: &str = "currency";
pub const VALUE_DATE: &str = "value_date";

/// Fields every canonical record carries regardless of message type.
pub const CORE_FIELDS: [&str; 5] = [TRANSACTION_ID, MESSAGE_TYPE, AMOUNT, CURRENCY, VALUE_DATE];

// ---------------------------------------------------------------------------
// Scalar values
// ---------------------------------------------------------------------------

/// A scalar held by a canonical record.
///
/// JSON strings deserialize as `Text` and JSON numbers as `Number`; how a
/// value is compared is decided by the rule table, not by the variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(Decimal),
    Date(NaiveDate),
}

impl FieldValue {
    /// Absent-equivalent: empty or whitespace-only text.
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim().is_empty())
    }

    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Number(d) => Some(*d),
            Self::Text(s) => Decimal::from_str(s.trim()).ok(),
            Self::Date(_) => None,
        }
    }

    /// Calendar date; any time-of-day component is dropped.
    pub fn to_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            Self::Text(s) => parse_date(s.trim()),
            Self::Number(_) => None,
        }
    }

    pub fn to_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Date(d) => d.and_hms_opt(0, 0, 0),
            Self::Text(s) => parse_timestamp(s.trim()),
            Self::Number(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::Number(d) => write!(f, "{d}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Decimal> for FieldValue {
    fn from(d: Decimal) -> Self {
        Self::Number(d)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.date())
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Some(dt) = TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return Some(dt);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Compliance risk of a discrepancy. Ordered most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[serde(alias = "high")]
    High,
    #[serde(alias = "medium")]
    Medium,
    #[serde(alias = "low")]
    Low,
}

impl Severity {
    /// Most severe of the given severities, `None` for an empty input.
    pub fn worst(iter: impl IntoIterator<Item = Severity>) -> Option<Severity> {
        iter.into_iter().min()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
        }
    }
}

// ---------------------------------------------------------------------------
// Canonical record + identity
// ---------------------------------------------------------------------------

/// Composite identity used to pair records across the two feeds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct IdentityKey {
    pub transaction_id: String,
    pub message_type: String,
}

impl IdentityKey {
    pub fn new(transaction_id: impl Into<String>, message_type: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            message_type: message_type.into(),
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.transaction_id, self.message_type)
    }
}

/// Flat, ordered key-value view of one transaction.
///
/// Deserializes from a JSON/TOML object; `null` members are treated as
/// absent so optional fields never produce comparison noise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "BTreeMap<String, Option<FieldValue>>")]
pub struct CanonicalRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl CanonicalRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for fixtures.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Present and non-blank value for `field`.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field).filter(|v| !v.is_blank())
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Trimmed text of an identity component, if present.
    pub fn text(&self, field: &str) -> Option<String> {
        self.get(field).map(|v| v.to_string().trim().to_string())
    }

    pub fn transaction_id(&self) -> Option<String> {
        self.text(TRANSACTION_ID)
    }

    pub fn message_type(&self) -> Option<String> {
        self.text(MESSAGE_TYPE)
    }

    /// Identity key, or the name of the first identity field that is missing.
    pub fn identity_key(&self) -> Result<IdentityKey, &'static str> {
        let transaction_id = self.transaction_id().ok_or(TRANSACTION_ID)?;
        let message_type = self.message_type().ok_or(MESSAGE_TYPE)?;
        Ok(IdentityKey {
            transaction_id,
            message_type,
        })
    }
}

impl From<BTreeMap<String, Option<FieldValue>>> for CanonicalRecord {
    fn from(map: BTreeMap<String, Option<FieldValue>>) -> Self {
        Self {
            fields: map
                .into_iter()
                .filter_map(|(k, v)| v.map(|v| (k, v)))
                .collect(),
        }
    }
}

impl From<BTreeMap<String, FieldValue>> for CanonicalRecord {
    fn from(fields: BTreeMap<String, FieldValue>) -> Self {
        Self { fields }
    }
}

impl Serialize for CanonicalRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// Source messages
// ---------------------------------------------------------------------------

/// pacs.008: FI to FI customer credit transfer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Pacs008 {
    pub transaction_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub value_date: NaiveDate,
    pub debtor_name: String,
    pub debtor_account: String,
    #[serde(default)]
    pub debtor_bic: Option<String>,
    pub creditor_name: String,
    pub creditor_account: String,
    #[serde(default)]
    pub creditor_bic: Option<String>,
    #[serde(default)]
    pub remittance_info: Option<String>,
    #[serde(default)]
    pub instruction_id: Option<String>,
    pub end_to_end_id: String,
}

/// pacs.009: financial institution credit transfer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Pacs009 {
    pub transaction_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub value_date: NaiveDate,
    pub instructing_agent: String,
    pub instructed_agent: String,
    #[serde(default)]
    pub creditor_institution: Option<String>,
    #[serde(default)]
    pub debtor_institution: Option<String>,
    #[serde(default)]
    pub settlement_method: Option<String>,
    #[serde(default)]
    pub instruction_id: Option<String>,
    pub end_to_end_id: String,
    #[serde(default)]
    pub purpose: Option<String>,
}

/// MT103: single customer credit transfer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Mt103 {
    pub transaction_id: String,
    pub transaction_reference: String,
    pub amount: Decimal,
    pub currency: String,
    pub value_date: NaiveDate,
    pub ordering_customer: String,
    #[serde(default)]
    pub ordering_institution: Option<String>,
    pub beneficiary_customer: String,
    #[serde(default)]
    pub beneficiary_institution: Option<String>,
    #[serde(default)]
    pub intermediary_institution: Option<String>,
    #[serde(default)]
    pub sender_to_receiver_info: Option<String>,
    #[serde(default)]
    pub remittance_info: Option<String>,
}

/// MT202: general financial institution transfer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Mt202 {
    pub transaction_id: String,
    pub transaction_reference: String,
    pub amount: Decimal,
    pub currency: String,
    pub value_date: NaiveDate,
    pub ordering_institution: String,
    pub beneficiary_institution: String,
    #[serde(default)]
    pub sender_correspondent: Option<String>,
    #[serde(default)]
    pub receiver_correspondent: Option<String>,
    #[serde(default)]
    pub intermediary: Option<String>,
    #[serde(default)]
    pub related_reference: Option<String>,
}

/// Payment-platform message of one of the known schemas.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "message_type")]
pub enum SourceMessage {
    #[serde(rename = "pacs.008")]
    Pacs008(Pacs008),
    #[serde(rename = "pacs.009")]
    Pacs009(Pacs009),
    #[serde(rename = "MT103")]
    Mt103(Mt103),
    #[serde(rename = "MT202")]
    Mt202(Mt202),
}

impl SourceMessage {
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Pacs008(_) => "pacs.008",
            Self::Pacs009(_) => "pacs.009",
            Self::Mt103(_) => "MT103",
            Self::Mt202(_) => "MT202",
        }
    }

    pub fn transaction_id(&self) -> &str {
        match self {
            Self::Pacs008(m) => &m.transaction_id,
            Self::Pacs009(m) => &m.transaction_id,
            Self::Mt103(m) => &m.transaction_id,
            Self::Mt202(m) => &m.transaction_id,
        }
    }

    /// Flatten into source-named fields. `None` options are left out.
    pub fn to_fields(&self) -> BTreeMap<String, FieldValue> {
        let mut out = FieldSink::default();
        match self {
            Self::Pacs008(m) => {
                out.core(&m.transaction_id, m.amount, &m.currency, m.value_date);
                out.put("debtor_name", &m.debtor_name);
                out.put("debtor_account", &m.debtor_account);
                out.opt("debtor_bic", &m.debtor_bic);
                out.put("creditor_name", &m.creditor_name);
                out.put("creditor_account", &m.creditor_account);
                out.opt("creditor_bic", &m.creditor_bic);
                out.opt("remittance_info", &m.remittance_info);
                out.opt("instruction_id", &m.instruction_id);
                out.put("end_to_end_id", &m.end_to_end_id);
            }
            Self::Pacs009(m) => {
                out.core(&m.transaction_id, m.amount, &m.currency, m.value_date);
                out.put("instructing_agent", &m.instructing_agent);
                out.put("instructed_agent", &m.instructed_agent);
                out.opt("creditor_institution", &m.creditor_institution);
                out.opt("debtor_institution", &m.debtor_institution);
                out.opt("settlement_method", &m.settlement_method);
                out.opt("instruction_id", &m.instruction_id);
                out.put("end_to_end_id", &m.end_to_end_id);
                out.opt("purpose", &m.purpose);
            }
            Self::Mt103(m) => {
                out.core(&m.transaction_id, m.amount, &m.currency, m.value_date);
                out.put("transaction_reference", &m.transaction_reference);
                out.put("ordering_customer", &m.ordering_customer);
                out.opt("ordering_institution", &m.ordering_institution);
                out.put("beneficiary_customer", &m.beneficiary_customer);
                out.opt("beneficiary_institution", &m.beneficiary_institution);
                out.opt("intermediary_institution", &m.intermediary_institution);
                out.opt("sender_to_receiver_info", &m.sender_to_receiver_info);
                out.opt("remittance_info", &m.remittance_info);
            }
            Self::Mt202(m) => {
                out.core(&m.transaction_id, m.amount, &m.currency, m.value_date);
                out.put("transaction_reference", &m.transaction_reference);
                out.put("ordering_institution", &m.ordering_institution);
                out.put("beneficiary_institution", &m.beneficiary_institution);
                out.opt("sender_correspondent", &m.sender_correspondent);
                out.opt("receiver_correspondent", &m.receiver_correspondent);
                out.opt("intermediary", &m.intermediary);
                out.opt("related_reference", &m.related_reference);
            }
        }
        out.0
    }
}

#[derive(Default)]
struct FieldSink(BTreeMap<String, FieldValue>);

impl FieldSink {
    fn core(&mut self, transaction_id: &str, amount: Decimal, currency: &str, value_date: NaiveDate) {
        self.put(TRANSACTION_ID, transaction_id);
        self.0.insert(AMOUNT.into(), FieldValue::Number(amount));
        self.put(CURRENCY, currency);
        self.0.insert(VALUE_DATE.into(), FieldValue::Date(value_date));
    }

    fn put(&mut self, name: &str, value: &str) {
        self.0.insert(name.into(), FieldValue::Text(value.to_string()));
    }

    fn opt(&mut self, name: &str, value: &Option<String>) {
        if let Some(v) = value {
            self.put(name, v);
        }
    }
}

/// Untyped message whose schema lives only in the rule table.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub message_type: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl RawMessage {
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }
}

/// One entry of the source feed, in whatever shape the caller has it.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRecord {
    Message(SourceMessage),
    Raw(RawMessage),
    Canonical(CanonicalRecord),
}

impl SourceRecord {
    /// Best-effort transaction id, for error reporting.
    pub fn transaction_id(&self) -> Option<String> {
        match self {
            Self::Message(m) => Some(m.transaction_id().to_string()),
            Self::Raw(r) => r
                .fields
                .get(TRANSACTION_ID)
                .filter(|v| !v.is_blank())
                .map(|v| v.to_string()),
            Self::Canonical(c) => c.transaction_id(),
        }
    }

    /// Best-effort message type, for error reporting.
    pub fn message_type(&self) -> Option<String> {
        match self {
            Self::Message(m) => Some(m.message_type().to_string()),
            Self::Raw(r) => Some(r.message_type.clone()),
            Self::Canonical(c) => c.message_type(),
        }
    }
}

impl From<SourceMessage> for SourceRecord {
    fn from(m: SourceMessage) -> Self {
        Self::Message(m)
    }
}

impl From<RawMessage> for SourceRecord {
    fn from(r: RawMessage) -> Self {
        Self::Raw(r)
    }
}

impl From<CanonicalRecord> for SourceRecord {
    fn from(c: CanonicalRecord) -> Self {
        Self::Canonical(c)
    }
}
