//! Selection layer - eligibility predicates, tier planning, readiness
//! reconciliation, and the hand-off to the submission engine.

#![warn(missing_docs)]

pub mod error;
pub mod config;
pub mod builder;
pub mod planner;
pub mod reconciler;
pub mod report;
pub mod resolver;
pub mod submit;

pub use error::{SelectionError, EmptyResult, Result};
pub use config::{OutsourceConfig, ContextSpec, CapPolicy};
pub use builder::{EligibilityBuilder, SubsystemPlan, ActiveProduct};
pub use planner::{QueryPlanner, Tier, TierQueries, TierResults};
pub use reconciler::Reconciler;
pub use report::{SelectionReport, RunSummary, DropReason, PartialRequestWarning, TierCounts};
pub use resolver::ReadinessResolver;
pub use submit::{SubmissionEngine, SpoolSubmitter, WorkflowRequest, RunRequest, ProductRequest, HandoffFlags};
