//! The readiness resolver - runs one full resolution pass.

use outsource_catalog::Catalog;
use outsource_core::SelectionConstraints;
use tracing::{debug, info};
use crate::{
    ContextSpec, EligibilityBuilder, OutsourceConfig, QueryPlanner, Reconciler, Result,
    SelectionReport, SubsystemPlan, TierQueries,
};

/// Resolves which runs are ready for processing.
///
/// Runs the pass:
/// ```text
/// constraints → subsystem predicates → tier A/B/C queries → B ∩ C → report
/// ```
pub struct ReadinessResolver<C: Catalog> {
    planner: QueryPlanner<C>,
    reconciler: Reconciler,
    config: OutsourceConfig,
    context_name: String,
    context: ContextSpec,
}

impl<C: Catalog> ReadinessResolver<C> {
    /// Create a resolver for the processing context `context_name`.
    ///
    /// Fails with a configuration error if the configuration is inconsistent
    /// or the context is unknown.
    pub fn new(catalog: C, config: OutsourceConfig, context_name: impl Into<String>) -> Result<Self> {
        config.validate()?;
        let context_name = context_name.into();
        let context = config.context(&context_name)?.clone();
        let planner = QueryPlanner::new(catalog).with_cap_policy(config.cap_policy);

        Ok(Self {
            planner,
            reconciler: Reconciler::new(),
            config,
            context_name,
            context,
        })
    }

    /// Override the cap policy from configuration.
    pub fn with_cap_policy(mut self, cap_policy: crate::CapPolicy) -> Self {
        self.planner = self.planner.with_cap_policy(cap_policy);
        self
    }

    /// Build subsystem plans and tier queries without touching the catalog.
    pub fn plan(&self, constraints: &SelectionConstraints) -> Result<(Vec<SubsystemPlan>, TierQueries)> {
        let plans = EligibilityBuilder::new(&self.config, &self.context).build(constraints)?;
        let queries = self.planner.plan(&plans, constraints.limit);
        Ok((plans, queries))
    }

    /// Run one resolution pass.
    pub async fn resolve(&self, constraints: &SelectionConstraints) -> Result<SelectionReport> {
        info!(
            "Resolving runs for context {} (detector: {}, cap policy: {:?})",
            self.context_name,
            constraints.detector,
            self.planner.cap_policy()
        );

        let (plans, queries) = self.plan(constraints)?;
        for plan in &plans {
            debug!(
                "{}: {} products, calibration window {} .. {}",
                plan.detector,
                plan.products.len(),
                plan.window.start,
                plan.window.end
            );
        }

        let results = self.planner.execute(&queries).await?;
        let report = self.reconciler.reconcile(&results, &plans, constraints.runs.as_ref())?;
        report.log_diagnostics();
        Ok(report)
    }

    /// Name of the processing context.
    pub fn context_name(&self) -> &str {
        &self.context_name
    }

    /// The processing context.
    pub fn context(&self) -> &ContextSpec {
        &self.context
    }

    /// The configuration.
    pub fn config(&self) -> &OutsourceConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use outsource_catalog::{CatalogQuery, SnapshotCatalog};
    use outsource_core::{
        CalibrationWindow, DataRecord, Detector, DetectorSelection, RecordStatus, Run, RunNumber, Time,
    };
    use crate::{EmptyResult, SelectionError};

    const HASH: &str = "rfzvpzj4mf";

    fn t(year: i32, month: u32) -> Time {
        Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap()
    }

    fn config() -> OutsourceConfig {
        let mut config = OutsourceConfig::default();
        config.min_run_number = RunNumber::new(100);
        config.allowed_raw_locations = vec!["SITE_A".into(), "SITE_B".into()];
        for spec in config.subsystems.values_mut() {
            spec.to_process.truncate(2);
        }

        let mut context = ContextSpec::default();
        for spec in config.subsystems.values() {
            for product in &spec.to_process {
                context.hashes.insert(product.clone(), HASH.into());
            }
            context.calibration_models.insert(spec.calibration_model_key.clone(), "v1".into());
        }
        let keys: Vec<String> = config.subsystems.values().map(|s| s.calibration_model_key.clone()).collect();
        for key in keys {
            config
                .calibration_windows
                .entry(key)
                .or_default()
                .insert("v1".into(), CalibrationWindow::new(t(2022, 1), t(2023, 1)));
        }
        config.contexts.insert("online".into(), context);
        config
    }

    fn raw(location: &str) -> DataRecord {
        DataRecord::new("raw_records", "rucio-catalogue", RecordStatus::Transferred).at(location)
    }

    fn produced(product: &str, number: u32) -> DataRecord {
        DataRecord::new(product, "rucio-catalogue", RecordStatus::Transferred)
            .with_did(DataRecord::did_for(RunNumber::new(number), product, HASH))
    }

    fn tpc_run(number: u32) -> Run {
        Run::new(number).with_mode("tpc_bkg").with_start(t(2022, 6)).with_detector("tpc")
    }

    fn catalog() -> SnapshotCatalog {
        SnapshotCatalog::new(vec![
            // ready: raw in place, nothing produced
            tpc_run(150).with_record(raw("SITE_A")),
            // ready: one of two products produced
            tpc_run(151).with_record(raw("SITE_B")).with_record(produced("peaklets", 151)),
            // raw at a site we may not read from
            tpc_run(152).with_record(raw("SITE_C")),
            // everything produced
            tpc_run(153)
                .with_record(raw("SITE_A"))
                .with_record(produced("peaklets", 153))
                .with_record(produced("lone_hits", 153)),
            // tagged bad
            tpc_run(154).with_record(raw("SITE_A")).with_tag("bad"),
            // below the configured minimum
            tpc_run(99).with_record(raw("SITE_A")),
            // outside the calibration window
            tpc_run(155).with_start(t(2023, 3)).with_record(raw("SITE_A")),
        ])
    }

    #[tokio::test]
    async fn test_resolve_end_to_end() {
        let resolver = ReadinessResolver::new(catalog(), config(), "online").unwrap();
        let report = resolver.resolve(&SelectionConstraints::new()).await.unwrap();

        assert_eq!(report.sorted_runs(), vec![RunNumber::new(150), RunNumber::new(151)]);
        assert_eq!(report.counts.baseline, 4);
        assert_eq!(report.runs[&RunNumber::new(151)].missing_products, vec!["lone_hits".to_string()]);
        assert_eq!(report.runs[&RunNumber::new(150)].missing_products.len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let resolver = ReadinessResolver::new(catalog(), config(), "online").unwrap();
        let constraints = SelectionConstraints::new().with_runs([150, 151, 152, 999].map(RunNumber::new));
        let first = resolver.resolve(&constraints).await.unwrap();
        let second = resolver.resolve(&constraints).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.partial_request.unwrap().dropped.len(), 2);
    }

    #[tokio::test]
    async fn test_cap_applies_to_diagnostics_only() {
        let resolver = ReadinessResolver::new(catalog(), config(), "online").unwrap();
        let report = resolver.resolve(&SelectionConstraints::new().with_limit(1)).await.unwrap();
        assert_eq!(report.counts.baseline, 1);
        assert_eq!(report.worklist.len(), 2);
    }

    #[tokio::test]
    async fn test_nothing_eligible_vs_none_ready() {
        let resolver = ReadinessResolver::new(catalog(), config(), "online").unwrap();

        let nothing = SelectionConstraints::new().with_modes(vec!["led".into()]);
        let err = resolver.resolve(&nothing).await.unwrap_err();
        assert!(matches!(err, SelectionError::EmptyResult(EmptyResult::NothingEligible)));

        let not_ready = SelectionConstraints::new().with_runs([152, 153].map(RunNumber::new));
        let err = resolver.resolve(&not_ready).await.unwrap_err();
        assert!(matches!(err, SelectionError::EmptyResult(EmptyResult::NoneReady { eligible: 2, .. })));
    }

    #[tokio::test]
    async fn test_unknown_context_fails_before_catalog_access() {
        struct CountingCatalog(Arc<AtomicUsize>);

        #[async_trait]
        impl Catalog for CountingCatalog {
            async fn find(&self, _query: &CatalogQuery) -> outsource_catalog::Result<Vec<Run>> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let err = ReadinessResolver::new(CountingCatalog(calls.clone()), config(), "offline")
            .err()
            .unwrap();
        assert!(matches!(err, SelectionError::Configuration(_)));

        let resolver = ReadinessResolver::new(CountingCatalog(calls.clone()), config(), "online").unwrap();
        let mut broken = config();
        broken.contexts.get_mut("online").unwrap().calibration_models.clear();
        let broken = ReadinessResolver::new(CountingCatalog(calls.clone()), broken, "online").unwrap();
        let only_tpc = SelectionConstraints::new().with_detector(DetectorSelection::One(Detector::Tpc));
        assert!(matches!(broken.resolve(&only_tpc).await, Err(SelectionError::Configuration(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(resolver.resolve(&only_tpc).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
