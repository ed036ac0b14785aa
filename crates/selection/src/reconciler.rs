//! Readiness reconciliation.
//!
//! The worklist is the intersection of tier B and tier C. Tier A only feeds
//! diagnostics.

use std::collections::{BTreeMap, BTreeSet};
use outsource_core::{Run, RunNumber};
use crate::{
    DropReason, EmptyResult, PartialRequestWarning, Result, RunSummary, SelectionError,
    SelectionReport, SubsystemPlan, TierCounts, TierResults,
};

/// Combines tier results into a selection report.
#[derive(Debug, Default)]
pub struct Reconciler;

impl Reconciler {
    /// Create a reconciler.
    pub fn new() -> Self {
        Self
    }

    /// Intersect tiers B and C, attribute drop reasons, and fail if nothing
    /// is ready.
    pub fn reconcile(
        &self,
        results: &TierResults,
        plans: &[SubsystemPlan],
        requested: Option<&BTreeSet<RunNumber>>,
    ) -> Result<SelectionReport> {
        let eligible = numbers(&results.baseline);
        let raw_available = numbers(&results.raw_available);
        let outputs_missing = numbers(&results.outputs_missing);

        let worklist: BTreeSet<RunNumber> = raw_available.intersection(&outputs_missing).copied().collect();

        if worklist.is_empty() {
            let reason = if eligible.is_empty() && raw_available.is_empty() && outputs_missing.is_empty() {
                EmptyResult::NothingEligible
            } else {
                EmptyResult::NoneReady {
                    eligible: eligible.len(),
                    raw_available: raw_available.len(),
                    outputs_missing: outputs_missing.len(),
                }
            };
            return Err(SelectionError::EmptyResult(reason));
        }

        let reason = |number: &RunNumber| {
            let in_b = raw_available.contains(number);
            let in_c = outputs_missing.contains(number);
            match (eligible.contains(number) || in_b || in_c, in_b, in_c) {
                (false, _, _) => DropReason::Ineligible,
                (true, false, false) => DropReason::RawUnavailableAndOutputsPresent,
                (true, false, true) => DropReason::RawUnavailable,
                _ => DropReason::OutputsPresent,
            }
        };

        let excluded: BTreeMap<RunNumber, DropReason> = eligible
            .difference(&worklist)
            .map(|n| (*n, reason(n)))
            .collect();

        let partial_request = requested
            .map(|requested| PartialRequestWarning {
                dropped: requested.difference(&worklist).map(|n| (*n, reason(n))).collect(),
            })
            .filter(|partial| !partial.dropped.is_empty());

        let mut runs = BTreeMap::new();
        for run in results.outputs_missing.iter().filter(|r| worklist.contains(&r.number)) {
            runs.insert(run.number, summarize(run, plans)?);
        }

        Ok(SelectionReport {
            worklist,
            runs,
            counts: TierCounts {
                baseline: results.baseline.len(),
                raw_available: results.raw_available.len(),
                outputs_missing: results.outputs_missing.len(),
            },
            baseline_modes: modes(&results.baseline),
            raw_available_modes: modes(&results.raw_available),
            excluded,
            partial_request,
        })
    }
}

fn numbers(runs: &[Run]) -> BTreeSet<RunNumber> {
    runs.iter().map(|r| r.number).collect()
}

fn modes(runs: &[Run]) -> BTreeSet<String> {
    runs.iter().filter_map(|r| r.mode.clone()).collect()
}

/// Products still missing for `run`, across every subsystem it is eligible
/// under and whose raw input is in place.
fn summarize(run: &Run, plans: &[SubsystemPlan]) -> Result<RunSummary> {
    let mut missing_products: Vec<String> = Vec::new();
    for plan in plans {
        if !plan.baseline.evaluate(run)? || !plan.raw_available.evaluate(run)? {
            continue;
        }
        for product in &plan.products {
            if !product.produced.evaluate(run)? && !missing_products.contains(&product.name) {
                missing_products.push(product.name.clone());
            }
        }
    }

    Ok(RunSummary {
        number: run.number,
        mode: run.mode.clone(),
        detectors: run.detectors.clone(),
        missing_products,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ActiveProduct, Tier};
    use outsource_core::{CalibrationWindow, DataRecord, Detector, Field, Predicate, RecordStatus};
    use chrono::{TimeZone, Utc};

    fn set(items: &[u32]) -> BTreeSet<RunNumber> {
        items.iter().copied().map(RunNumber::new).collect()
    }

    fn rows(items: &[u32]) -> Vec<Run> {
        items
            .iter()
            .map(|n| Run::new(*n).with_mode(if n % 2 == 0 { "tpc_bkg" } else { "tpc_kr83m" }).with_detector("tpc"))
            .collect()
    }

    fn results(a: &[u32], b: &[u32], c: &[u32]) -> TierResults {
        TierResults {
            baseline: rows(a),
            raw_available: rows(b),
            outputs_missing: rows(c),
        }
    }

    fn tpc_plan() -> SubsystemPlan {
        let produced = |name: &str| {
            Predicate::elem_match(Predicate::and(vec![
                Predicate::eq(Field::DataType, name),
                Predicate::matches(Field::Did, "h1"),
            ]))
        };
        SubsystemPlan {
            detector: Detector::Tpc,
            window: CalibrationWindow::new(
                Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            ),
            products: ["peaklets", "event_info"]
                .into_iter()
                .map(|name| ActiveProduct { name: name.into(), hash: "h1".into(), produced: produced(name) })
                .collect(),
            baseline: Predicate::eq(Field::Detectors, "tpc"),
            raw_available: Predicate::always(),
            outputs_missing: Predicate::always(),
        }
    }

    #[test]
    fn test_worklist_is_b_intersect_c() {
        let report = Reconciler::new()
            .reconcile(&results(&[1, 2, 3, 4, 5], &[1, 2, 3], &[2, 3, 4]), &[tpc_plan()], None)
            .unwrap();

        assert_eq!(report.worklist, set(&[2, 3]));
        assert_eq!(report.excluded[&RunNumber::new(1)], DropReason::OutputsPresent);
        assert_eq!(report.excluded[&RunNumber::new(4)], DropReason::RawUnavailable);
        assert_eq!(report.excluded[&RunNumber::new(5)], DropReason::RawUnavailableAndOutputsPresent);
        assert_eq!(report.counts, TierCounts { baseline: 5, raw_available: 3, outputs_missing: 3 });
        assert_eq!(report.baseline_modes.len(), 2);
        assert!(report.partial_request.is_none());
    }

    #[test]
    fn test_tier_order_does_not_matter() {
        // fill the tiers back to front, as a reversed issue order would
        let mut reversed = TierResults::default();
        for tier in Tier::ALL.into_iter().rev() {
            let source = results(&[1, 2, 3, 4], &[4, 2, 1], &[2, 4, 3]);
            reversed.set(tier, source.get(tier).iter().rev().cloned().collect());
        }

        let forward = Reconciler::new()
            .reconcile(&results(&[1, 2, 3, 4], &[4, 2, 1], &[2, 4, 3]), &[tpc_plan()], None)
            .unwrap();
        let backward = Reconciler::new().reconcile(&reversed, &[tpc_plan()], None).unwrap();

        assert_eq!(forward.worklist, set(&[2, 4]));
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_partial_request_is_reported_not_raised() {
        let requested = set(&[2, 3, 9]);
        let report = Reconciler::new()
            .reconcile(&results(&[1, 2, 3], &[2, 3], &[2]), &[tpc_plan()], Some(&requested))
            .unwrap();

        assert_eq!(report.worklist, set(&[2]));
        let dropped = &report.partial_request.as_ref().unwrap().dropped;
        assert_eq!(dropped[&RunNumber::new(3)], DropReason::OutputsPresent);
        assert_eq!(dropped[&RunNumber::new(9)], DropReason::Ineligible);
        assert_eq!(dropped.len(), 2);
    }

    #[test]
    fn test_empty_results_are_distinguished() {
        let err = Reconciler::new().reconcile(&results(&[], &[], &[]), &[tpc_plan()], None).unwrap_err();
        assert!(matches!(err, SelectionError::EmptyResult(EmptyResult::NothingEligible)));

        let err = Reconciler::new()
            .reconcile(&results(&[1, 2], &[1], &[2]), &[tpc_plan()], None)
            .unwrap_err();
        assert!(matches!(
            err,
            SelectionError::EmptyResult(EmptyResult::NoneReady { eligible: 2, raw_available: 1, outputs_missing: 1 })
        ));
    }

    #[test]
    fn test_missing_products_are_attributed() {
        let done = DataRecord::new("peaklets", "rucio-catalogue", RecordStatus::Transferred)
            .with_did("xnt_000002:peaklets-h1");
        let mut tiers = results(&[2], &[2], &[]);
        tiers.outputs_missing = vec![Run::new(2u32).with_detector("tpc").with_record(done)];

        let report = Reconciler::new().reconcile(&tiers, &[tpc_plan()], None).unwrap();
        assert_eq!(report.runs[&RunNumber::new(2)].missing_products, vec!["event_info".to_string()]);
    }

    fn subsystem_plan(detector: Detector, raw_type: &str, products: &[&str]) -> SubsystemPlan {
        let mut plan = tpc_plan();
        plan.detector = detector;
        plan.baseline = Predicate::eq(Field::Detectors, detector.as_str());
        plan.raw_available = Predicate::elem_match(Predicate::eq(Field::DataType, raw_type));
        plan.products = products
            .iter()
            .map(|name| ActiveProduct {
                name: name.to_string(),
                hash: "h1".into(),
                produced: Predicate::elem_match(Predicate::eq(Field::DataType, *name)),
            })
            .collect();
        plan
    }

    #[test]
    fn test_missing_products_need_that_subsystems_raw_input() {
        let plans = [
            subsystem_plan(Detector::Tpc, "raw_records", &["peaklets", "event_info"]),
            subsystem_plan(Detector::NeutronVeto, "raw_records_nv", &["hitlets_nv", "events_nv"]),
        ];
        let raw = DataRecord::new("raw_records", "rucio-catalogue", RecordStatus::Transferred);
        let run = Run::new(7u32).with_detector("tpc").with_detector("neutron_veto").with_record(raw);

        let mut tiers = results(&[7], &[7], &[]);
        tiers.outputs_missing = vec![run];
        let report = Reconciler::new().reconcile(&tiers, &plans, None).unwrap();

        assert_eq!(
            report.runs[&RunNumber::new(7)].missing_products,
            vec!["peaklets".to_string(), "event_info".to_string()]
        );
    }

    #[test]
    fn test_truncated_baseline_is_not_nothing_eligible() {
        // a zero cap empties tier A while the uncapped readiness tiers still match
        let err = Reconciler::new()
            .reconcile(&results(&[], &[1], &[2]), &[tpc_plan()], None)
            .unwrap_err();
        assert!(matches!(
            err,
            SelectionError::EmptyResult(EmptyResult::NoneReady { eligible: 0, raw_available: 1, outputs_missing: 1 })
        ));
    }
}
