//! Three-tier query planning and execution.

use outsource_catalog::{Catalog, CatalogQuery, Projection, SortOrder};
use outsource_core::{Field, Predicate, Run};
use tracing::{debug, info};
use crate::{CapPolicy, Result, SelectionError, SubsystemPlan};

/// One of the three independently evaluated predicate sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Administrative eligibility alone (tier A)
    Baseline,
    /// Eligible and raw input available (tier B)
    RawAvailable,
    /// Eligible and missing at least one output (tier C)
    OutputsMissing,
}

impl Tier {
    /// All tiers.
    pub const ALL: [Tier; 3] = [Tier::Baseline, Tier::RawAvailable, Tier::OutputsMissing];
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Baseline => f.write_str("tier A (baseline)"),
            Self::RawAvailable => f.write_str("tier B (raw available)"),
            Self::OutputsMissing => f.write_str("tier C (outputs missing)"),
        }
    }
}

/// The three catalog queries of a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TierQueries {
    /// Tier A
    pub baseline: CatalogQuery,
    /// Tier B
    pub raw_available: CatalogQuery,
    /// Tier C
    pub outputs_missing: CatalogQuery,
}

impl TierQueries {
    /// Query for `tier`.
    pub fn get(&self, tier: Tier) -> &CatalogQuery {
        match tier {
            Tier::Baseline => &self.baseline,
            Tier::RawAvailable => &self.raw_available,
            Tier::OutputsMissing => &self.outputs_missing,
        }
    }
}

/// Rows returned by the three tier queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TierResults {
    /// Tier A rows
    pub baseline: Vec<Run>,
    /// Tier B rows
    pub raw_available: Vec<Run>,
    /// Tier C rows, with data records
    pub outputs_missing: Vec<Run>,
}

impl TierResults {
    /// Rows for `tier`.
    pub fn get(&self, tier: Tier) -> &[Run] {
        match tier {
            Tier::Baseline => &self.baseline,
            Tier::RawAvailable => &self.raw_available,
            Tier::OutputsMissing => &self.outputs_missing,
        }
    }

    /// Store rows for `tier`.
    pub fn set(&mut self, tier: Tier, runs: Vec<Run>) {
        match tier {
            Tier::Baseline => self.baseline = runs,
            Tier::RawAvailable => self.raw_available = runs,
            Tier::OutputsMissing => self.outputs_missing = runs,
        }
    }
}

/// Composes subsystem plans into tier queries and runs them against an
/// injected catalog.
pub struct QueryPlanner<C: Catalog> {
    catalog: C,
    cap_policy: CapPolicy,
}

impl<C: Catalog> QueryPlanner<C> {
    /// Create a planner over `catalog`.
    pub fn new(catalog: C) -> Self {
        Self {
            catalog,
            cap_policy: CapPolicy::default(),
        }
    }

    /// Set the cap policy.
    pub fn with_cap_policy(mut self, cap_policy: CapPolicy) -> Self {
        self.cap_policy = cap_policy;
        self
    }

    /// The configured cap policy.
    pub fn cap_policy(&self) -> CapPolicy {
        self.cap_policy
    }

    /// Build the three tier queries. A run qualifies for a tier if any
    /// subsystem's predicate for that tier matches.
    pub fn plan(&self, plans: &[SubsystemPlan], limit: Option<usize>) -> TierQueries {
        let readiness_limit = match self.cap_policy {
            CapPolicy::DiagnosticOnly => None,
            CapPolicy::PerTier => limit,
        };

        let baseline = any_of(plans, |p| p.baseline.clone());
        let raw_available = any_of(plans, |p| Predicate::and(vec![p.baseline.clone(), p.raw_available.clone()]));
        let outputs_missing = any_of(plans, |p| Predicate::and(vec![p.baseline.clone(), p.outputs_missing.clone()]));

        TierQueries {
            baseline: CatalogQuery::new(baseline)
                .with_projection(Projection::Summary)
                .with_limit(limit)
                .sorted_by(Field::Number, SortOrder::Descending),
            raw_available: CatalogQuery::new(raw_available)
                .with_projection(Projection::Summary)
                .with_limit(readiness_limit)
                .sorted_by(Field::Number, SortOrder::Descending),
            outputs_missing: CatalogQuery::new(outputs_missing)
                .with_projection(Projection::Full)
                .with_limit(readiness_limit)
                .sorted_by(Field::Number, SortOrder::Descending),
        }
    }

    /// Issue all three tier queries concurrently and wait for every one.
    pub async fn execute(&self, queries: &TierQueries) -> Result<TierResults> {
        let (baseline, raw_available, outputs_missing) = tokio::join!(
            self.run_tier(Tier::Baseline, queries),
            self.run_tier(Tier::RawAvailable, queries),
            self.run_tier(Tier::OutputsMissing, queries),
        );

        Ok(TierResults {
            baseline: baseline?,
            raw_available: raw_available?,
            outputs_missing: outputs_missing?,
        })
    }

    /// Issue one tier query. Every tier shares this failure path.
    pub async fn run_tier(&self, tier: Tier, queries: &TierQueries) -> Result<Vec<Run>> {
        let query = queries.get(tier);
        debug!("Querying {}: {}", tier, query.to_document());

        let runs = self
            .catalog
            .find(query)
            .await
            .map_err(|source| SelectionError::CatalogQuery {
                tier,
                predicate: query.predicate.to_string(),
                source,
            })?;

        info!("{} matched {} runs", tier, runs.len());
        Ok(runs)
    }
}

fn any_of(plans: &[SubsystemPlan], pick: impl Fn(&SubsystemPlan) -> Predicate) -> Predicate {
    Predicate::or(plans.iter().map(pick).collect())
}
