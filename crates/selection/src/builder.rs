//! Eligibility predicate builder.
//!
//! Turns caller constraints plus static configuration into one set of
//! predicates per in-scope subsystem.

use outsource_core::{
    CalibrationWindow, CompareOp, Detector, DetectorSelection, Field, Predicate, RunNumber,
    SelectionConstraints, SubsystemSpec,
};
use tracing::{debug, warn};
use crate::{ContextSpec, OutsourceConfig, Result, SelectionError};

/// Catalog status of a completed copy.
pub const TRANSFERRED: &str = "transferred";

/// A derived product enabled for this pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveProduct {
    /// Product name
    pub name: String,

    /// Lineage hash of the configured processing code
    pub hash: String,

    /// Matches runs that already hold this product at the current hash
    pub produced: Predicate,
}

/// Predicates contributed by one subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct SubsystemPlan {
    /// Subsystem
    pub detector: Detector,

    /// Calibration window the pass was built against
    pub window: CalibrationWindow,

    /// Products to produce, in processing order
    pub products: Vec<ActiveProduct>,

    /// Administrative eligibility
    pub baseline: Predicate,

    /// Raw input replicated to an allowed location
    pub raw_available: Predicate,

    /// At least one active product not yet produced
    pub outputs_missing: Predicate,
}

/// Builds per-subsystem predicates.
pub struct EligibilityBuilder<'a> {
    config: &'a OutsourceConfig,
    context: &'a ContextSpec,
}

impl<'a> EligibilityBuilder<'a> {
    /// Create a builder for one processing context.
    pub fn new(config: &'a OutsourceConfig, context: &'a ContextSpec) -> Self {
        Self { config, context }
    }

    /// Build the plans for every in-scope subsystem.
    ///
    /// Subsystems without active products or without a resolvable calibration
    /// window are skipped, unless the caller asked for that subsystem alone.
    pub fn build(&self, constraints: &SelectionConstraints) -> Result<Vec<SubsystemPlan>> {
        let required = |detector| constraints.detector == DetectorSelection::One(detector);
        let mut plans = Vec::new();

        for detector in Detector::ALL {
            if !constraints.detector.includes(detector) {
                continue;
            }

            let Some(spec) = self.config.subsystems.get(&detector) else {
                if required(detector) {
                    return Err(SelectionError::config(format!("subsystem {} is not configured", detector)));
                }
                debug!("Subsystem {} not configured; skipping", detector);
                continue;
            };

            let products = self.active_products(detector, spec);
            if products.is_empty() {
                warn!("Subsystem {} has no enabled products; skipping", detector);
                continue;
            }

            let Some(window) = self.config.calibration_window(spec, self.context) else {
                if required(detector) {
                    return Err(SelectionError::config(format!(
                        "calibration model '{}' for {} does not resolve to a validity window",
                        spec.calibration_model_key, detector
                    )));
                }
                warn!(
                    "Calibration model '{}' for {} is unresolved; skipping subsystem",
                    spec.calibration_model_key, detector
                );
                continue;
            };

            let baseline = self.baseline(detector, window, constraints);
            let raw_available = self.raw_available(spec);
            let outputs_missing = Predicate::or(
                products
                    .iter()
                    .map(|p| Predicate::not(p.produced.clone()))
                    .collect(),
            );

            debug!("Baseline for {}: {}", detector, baseline);
            plans.push(SubsystemPlan {
                detector,
                window,
                products,
                baseline,
                raw_available,
                outputs_missing,
            });
        }

        if plans.is_empty() {
            return Err(SelectionError::config(format!(
                "no subsystem is active for detector selection '{}'",
                constraints.detector
            )));
        }
        Ok(plans)
    }

    /// `to_process` narrowed to enabled products that have a processing hash.
    fn active_products(&self, detector: Detector, spec: &SubsystemSpec) -> Vec<ActiveProduct> {
        spec.to_process
            .iter()
            .filter(|name| self.config.is_enabled(name))
            .filter_map(|name| {
                let Some(hash) = self.context.hashes.get(name) else {
                    warn!("No processing hash for {} ({}); not requesting it", name, detector);
                    return None;
                };
                Some(ActiveProduct {
                    name: name.clone(),
                    hash: hash.clone(),
                    produced: self.produced(name, hash),
                })
            })
            .collect()
    }

    fn baseline(
        &self,
        detector: Detector,
        window: CalibrationWindow,
        constraints: &SelectionConstraints,
    ) -> Predicate {
        let (min, max) = effective_range(self.config, constraints);
        let mut clauses = vec![Predicate::compare(Field::Number, CompareOp::Gte, min)];
        if let Some(max) = max {
            clauses.push(Predicate::compare(Field::Number, CompareOp::Lte, max));
        }
        if let Some(runs) = &constraints.runs {
            clauses.push(Predicate::is_in(Field::Number, runs.iter().copied()));
        }

        clauses.push(Predicate::not_in(Field::Tags, self.config.excluded_tags.iter().map(String::as_str)));

        if constraints.modes.is_empty() {
            clauses.push(Predicate::not_in(Field::Mode, self.config.excluded_modes.iter().map(String::as_str)));
        } else {
            clauses.push(Predicate::is_in(Field::Mode, constraints.modes.iter().map(String::as_str)));
        }

        clauses.push(Predicate::compare(Field::Start, CompareOp::Gte, window.start));
        clauses.push(Predicate::compare(Field::Start, CompareOp::Lt, window.end));
        clauses.push(Predicate::eq(Field::Detectors, detector.as_str()));

        if !constraints.sources.is_empty() {
            clauses.push(Predicate::is_in(Field::Source, constraints.sources.iter().map(String::as_str)));
        }

        Predicate::and(clauses)
    }

    fn raw_available(&self, spec: &SubsystemSpec) -> Predicate {
        Predicate::elem_match(Predicate::and(vec![
            Predicate::eq(Field::DataType, spec.raw_type.as_str()),
            Predicate::eq(Field::Status, TRANSFERRED),
            Predicate::eq(Field::Host, self.config.catalog_authority.as_str()),
            Predicate::is_in(Field::Location, self.config.allowed_raw_locations.iter().map(String::as_str)),
        ]))
    }

    fn produced(&self, product: &str, hash: &str) -> Predicate {
        Predicate::elem_match(Predicate::and(vec![
            Predicate::eq(Field::DataType, product),
            Predicate::eq(Field::Status, TRANSFERRED),
            Predicate::eq(Field::Host, self.config.catalog_authority.as_str()),
            Predicate::matches(Field::Did, regex::escape(hash)),
        ]))
    }
}

/// Run-number bounds after combining caller and configured limits.
pub fn effective_range(
    config: &OutsourceConfig,
    constraints: &SelectionConstraints,
) -> (RunNumber, Option<RunNumber>) {
    let min = constraints.from.map_or(config.min_run_number, |from| from.max(config.min_run_number));
    let max = match (constraints.to, config.max_run_number) {
        (Some(to), Some(cap)) => Some(to.min(cap)),
        (to, cap) => to.or(cap),
    };
    (min, max)
}
