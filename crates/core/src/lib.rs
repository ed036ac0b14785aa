//! Outsource core data models.
//!
//! This crate defines the run catalog snapshot types and the typed predicate
//! tree the selection layer uses to ask the catalog which runs are ready for
//! processing.

#![warn(missing_docs)]

// Identities
mod id;

// Catalog snapshot
mod run;

// Static processing configuration
mod detector;
mod calibration;

// Caller input
mod constraints;

// Queries
pub mod predicate;

// Re-exports
pub use id::RunNumber;
pub use run::{Run, DataRecord, RecordStatus, DID_SCOPE_PREFIX};
pub use detector::{Detector, DetectorSelection, SubsystemSpec, UnknownDetector};
pub use calibration::CalibrationWindow;
pub use constraints::SelectionConstraints;
pub use predicate::{Predicate, Field, Value, CompareOp, Matcher, Document, PredicateError};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
