//! Error taxonomy of a resolution pass.

use outsource_catalog::CatalogError;
use outsource_core::{PredicateError, UnknownDetector};
use crate::planner::Tier;

/// Error type for selection operations.
pub type Result<T> = std::result::Result<T, SelectionError>;

/// Errors that abort a resolution pass.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    /// Conflicting or invalid configuration; raised before any catalog access
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A tier query failed to execute
    #[error("catalog query failed for {tier}: {source} (filter: {predicate})")]
    CatalogQuery {
        /// Failing tier
        tier: Tier,
        /// Rendered filter of the failing query
        predicate: String,
        /// Underlying catalog failure
        #[source]
        source: CatalogError,
    },

    /// The worklist came out empty
    #[error("{0}")]
    EmptyResult(EmptyResult),

    /// A predicate could not be evaluated locally
    #[error("invalid predicate: {0}")]
    Predicate(#[from] PredicateError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SelectionError {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

impl From<UnknownDetector> for SelectionError {
    fn from(e: UnknownDetector) -> Self {
        Self::Configuration(e.to_string())
    }
}

/// Why the worklist is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyResult {
    /// No tier matched anything
    NothingEligible,
    /// Eligible runs exist, but none is both raw-available and missing output
    NoneReady {
        /// Runs matched by the baseline tier
        eligible: usize,
        /// Runs with raw input available
        raw_available: usize,
        /// Runs missing at least one output
        outputs_missing: usize,
    },
}

impl std::fmt::Display for EmptyResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NothingEligible => write!(
                f,
                "no runs are administratively eligible: the baseline filters matched nothing"
            ),
            Self::NoneReady { eligible, raw_available, outputs_missing } => write!(
                f,
                "{} eligible runs but none is ready to process: {} have raw input available, \
                 {} are missing outputs, and no run is both",
                eligible, raw_available, outputs_missing
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_results_are_distinguishable() {
        let nothing = SelectionError::EmptyResult(EmptyResult::NothingEligible).to_string();
        let none_ready = SelectionError::EmptyResult(EmptyResult::NoneReady {
            eligible: 4,
            raw_available: 2,
            outputs_missing: 1,
        })
        .to_string();

        assert_ne!(nothing, none_ready);
        assert!(nothing.contains("administratively eligible"));
        assert!(none_ready.contains("4 eligible runs"));
    }

    #[test]
    fn test_unknown_detector_is_configuration_error() {
        let err: SelectionError = UnknownDetector("hcal".into()).into();
        assert!(matches!(err, SelectionError::Configuration(msg) if msg.contains("hcal")));
    }
}
