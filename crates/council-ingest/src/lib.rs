//! The student reconciliation engine.
//!
//! Takes untrusted records from the admissions intake feed (or the old
//! council), matches them against local students, decides per record what
//! to do and applies the decision atomically through a
//! [`council_core::store::StudentStore`]. Every change is recorded in the
//! transaction log, which is also what [`audit::revert`] replays.
//!
//! # Pipeline
//!
//! ```text
//! raw JSON ─ record::IncomingRecord::parse
//!            └─ resolver::resolve        (match basis 1–5)
//!               └─ classifier::classify  (create/update/ignore/shift/enroll/reject)
//!                  └─ validate + mapper  (issues 3x/40/50)
//!                     └─ writer::plan_*  → StudentStore::commit
//! ```

pub mod audit;
pub mod catalog;
pub mod classifier;
pub mod engine;
pub mod error;
pub mod legacy;
pub mod mapper;
pub mod outcome;
pub mod patterns;
pub mod record;
pub mod resolver;
pub mod rules;
pub mod settings;
pub mod unique_id;
pub mod validate;
pub mod writer;

pub use engine::{CleanupReport, Ingestor};
pub use error::{IngestError, LegacyError, RevertError};
pub use outcome::{OutcomeCode, RecordOutcome, Verdict};
pub use settings::{IngestSettings, LegacySettings};

#[cfg(test)]
mod tests;
