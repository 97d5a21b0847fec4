//! `screening-recon`: reconciles payment-platform messages against the
//! compliance screening record.
//!
//! Pure engine crate: receives pre-loaded records, returns the report.
//! No CLI or IO dependencies.

pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod index;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod report;

pub use config::RuleTable;
pub use engine::{reconcile, reconcile_with, RunOptions};
pub use error::{EngineError, RecordErrorKind};
pub use model::{CanonicalRecord, FieldValue, IdentityKey, RawMessage, Severity, SourceMessage, SourceRecord};
pub use report::ReconciliationReport;
