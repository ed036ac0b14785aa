//! Selection report handed to the submission engine.

use std::collections::{BTreeMap, BTreeSet};
use outsource_core::RunNumber;
use serde::Serialize;
use tracing::{info, warn};

/// Why an eligible or requested run is not on the worklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Excluded by the baseline filters
    Ineligible,
    /// Raw input not replicated to an allowed location
    RawUnavailable,
    /// Every requested output already exists
    OutputsPresent,
    /// Both of the above
    RawUnavailableAndOutputsPresent,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Ineligible => "excluded by baseline filters",
            Self::RawUnavailable => "raw input not available",
            Self::OutputsPresent => "outputs already produced",
            Self::RawUnavailableAndOutputsPresent => "raw input not available and outputs already produced",
        })
    }
}

/// Worklist entry metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Run number
    pub number: RunNumber,
    /// Operating mode
    pub mode: Option<String>,
    /// Detector subsystems covered
    pub detectors: Vec<String>,
    /// Enabled products not yet produced, in processing order
    pub missing_products: Vec<String>,
}

/// Requested runs that did not make the worklist. Reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialRequestWarning {
    /// Dropped runs and why
    pub dropped: BTreeMap<RunNumber, DropReason>,
}

impl std::fmt::Display for PartialRequestWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} requested runs did not pass dependency checks:", self.dropped.len())?;
        for (number, reason) in &self.dropped {
            write!(f, " {} ({});", number.get(), reason)?;
        }
        Ok(())
    }
}

/// Row counts per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    /// Tier A
    pub baseline: usize,
    /// Tier B
    pub raw_available: usize,
    /// Tier C
    pub outputs_missing: usize,
}

/// Outcome of a successful resolution pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionReport {
    /// Runs ready for processing
    pub worklist: BTreeSet<RunNumber>,

    /// Metadata for every worklist run
    pub runs: BTreeMap<RunNumber, RunSummary>,

    /// Tier row counts
    pub counts: TierCounts,

    /// Modes seen in tier A
    pub baseline_modes: BTreeSet<String>,

    /// Modes seen in tier B
    pub raw_available_modes: BTreeSet<String>,

    /// Eligible runs left off the worklist and why
    pub excluded: BTreeMap<RunNumber, DropReason>,

    /// Requested runs left off the worklist
    pub partial_request: Option<PartialRequestWarning>,
}

impl SelectionReport {
    /// Worklist in ascending run order.
    pub fn sorted_runs(&self) -> Vec<RunNumber> {
        self.worklist.iter().copied().collect()
    }

    /// Lowest and highest worklist run.
    pub fn bounds(&self) -> Option<(RunNumber, RunNumber)> {
        Some((*self.worklist.first()?, *self.worklist.last()?))
    }

    /// Surface non-fatal diagnostics to the operator.
    pub fn log_diagnostics(&self) {
        info!(
            "Tiers matched {} eligible / {} raw-available / {} missing-output runs; {} ready",
            self.counts.baseline,
            self.counts.raw_available,
            self.counts.outputs_missing,
            self.worklist.len()
        );
        if !self.baseline_modes.is_empty() {
            info!("Eligible modes: {}", join(&self.baseline_modes));
        }
        if !self.raw_available_modes.is_empty() {
            info!("Raw-available modes: {}", join(&self.raw_available_modes));
        }
        if let Some(partial) = &self.partial_request {
            warn!("{}", partial);
        }
    }
}

fn join(items: &BTreeSet<String>) -> String {
    items.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_and_partial_message() {
        let report = SelectionReport {
            worklist: [12u32, 3, 7].into_iter().map(RunNumber::new).collect(),
            runs: BTreeMap::new(),
            counts: TierCounts::default(),
            baseline_modes: BTreeSet::new(),
            raw_available_modes: BTreeSet::new(),
            excluded: BTreeMap::new(),
            partial_request: Some(PartialRequestWarning {
                dropped: [(RunNumber::new(100), DropReason::Ineligible)].into_iter().collect(),
            }),
        };

        assert_eq!(report.bounds(), Some((RunNumber::new(3), RunNumber::new(12))));
        assert_eq!(report.sorted_runs(), vec![RunNumber::new(3), RunNumber::new(7), RunNumber::new(12)]);
        let message = report.partial_request.as_ref().unwrap().to_string();
        assert!(message.starts_with("1 requested runs"));
        assert!(message.contains("100 (excluded by baseline filters)"));
    }
}
