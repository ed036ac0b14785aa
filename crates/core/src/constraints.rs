//! Caller-supplied selection constraints.

use std::collections::BTreeSet;
use crate::{DetectorSelection, RunNumber};

/// Constraints a caller places on one resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionConstraints {
    /// Lowest run number wanted
    pub from: Option<RunNumber>,

    /// Highest run number wanted
    pub to: Option<RunNumber>,

    /// Explicit allowlist, combined with the number range by AND
    pub runs: Option<BTreeSet<RunNumber>>,

    /// Operating-mode allowlist; empty means "all but the excluded modes"
    pub modes: Vec<String>,

    /// Source allowlist; empty means any source
    pub sources: Vec<String>,

    /// Subsystems in scope
    pub detector: DetectorSelection,

    /// Result cap
    pub limit: Option<usize>,
}

impl SelectionConstraints {
    /// Create unconstrained selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the run-number range.
    pub fn with_range(mut self, from: Option<RunNumber>, to: Option<RunNumber>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Restrict to an explicit run list.
    pub fn with_runs(mut self, runs: impl IntoIterator<Item = RunNumber>) -> Self {
        self.runs = Some(runs.into_iter().collect());
        self
    }

    /// Restrict operating modes.
    pub fn with_modes(mut self, modes: Vec<String>) -> Self {
        self.modes = modes;
        self
    }

    /// Restrict sources.
    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    /// Restrict subsystems.
    pub fn with_detector(mut self, detector: DetectorSelection) -> Self {
        self.detector = detector;
        self
    }

    /// Cap the number of results.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
