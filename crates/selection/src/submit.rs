//! Hand-off to the workflow submission engine.
//!
//! This side only describes the work. The engine turns a [`WorkflowRequest`]
//! into jobs; the flags it carries are threaded through uninterpreted.

use std::path::{Path, PathBuf};
use async_trait::async_trait;
use outsource_core::{DataRecord, RunNumber};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;
use crate::{ContextSpec, OutsourceConfig, Result, SelectionReport};

/// Intents passed through to the submission engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffFlags {
    /// Reprocess even if outputs exist
    pub force: bool,
    /// Update the catalog when jobs complete
    pub update_catalog: bool,
    /// Upload outputs when jobs complete
    pub upload: bool,
}

impl HandoffFlags {
    /// Flags for a normal run; `debug` disables every catalog-facing intent.
    pub fn new(force: bool, debug: bool) -> Self {
        Self {
            force,
            update_catalog: !debug,
            upload: !debug,
        }
    }
}

/// One product to produce for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRequest {
    /// Product name
    pub name: String,
    /// Data identifier the output will carry
    pub did: String,
    /// Upload destination; `None` keeps the product local
    pub destination: Option<String>,
}

/// One run to process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Run number
    pub number: RunNumber,
    /// Detector subsystems covered
    pub detectors: Vec<String>,
    /// Operating mode
    pub mode: Option<String>,
    /// Products to produce
    pub products: Vec<ProductRequest>,
}

/// Everything the submission engine needs for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    /// Processing context identifier
    pub context: String,
    /// Reprocess even if outputs exist
    pub force: bool,
    /// Update the catalog when jobs complete
    pub update_catalog: bool,
    /// Upload outputs when jobs complete
    pub upload: bool,
    /// Runs, ascending
    pub runs: Vec<RunRequest>,
}

impl WorkflowRequest {
    /// Describe the worklist of `report`.
    pub fn from_report(
        report: &SelectionReport,
        config: &OutsourceConfig,
        context_name: &str,
        context: &ContextSpec,
        flags: HandoffFlags,
    ) -> Self {
        let runs = report
            .sorted_runs()
            .into_iter()
            .filter_map(|number| report.runs.get(&number))
            .map(|summary| RunRequest {
                number: summary.number,
                detectors: summary.detectors.clone(),
                mode: summary.mode.clone(),
                products: summary
                    .missing_products
                    .iter()
                    .filter_map(|name| {
                        let hash = context.hashes.get(name)?;
                        Some(ProductRequest {
                            name: name.clone(),
                            did: DataRecord::did_for(summary.number, name, hash),
                            destination: config.destination_for(name).map(str::to_string),
                        })
                    })
                    .collect(),
            })
            .collect();

        Self {
            context: context_name.to_string(),
            force: flags.force,
            update_catalog: flags.update_catalog,
            upload: flags.upload,
            runs,
        }
    }

    /// Run numbers in submission order.
    pub fn run_numbers(&self) -> Vec<RunNumber> {
        self.runs.iter().map(|r| r.number).collect()
    }
}

/// The external workflow submission engine.
#[async_trait]
pub trait SubmissionEngine: Send + Sync {
    /// Hand over a request; returns an engine-specific handle.
    async fn submit(&self, request: &WorkflowRequest) -> Result<String>;
}

/// Writes requests as JSON files into a spool directory for the engine to
/// pick up.
pub struct SpoolSubmitter {
    dir: PathBuf,
}

impl SpoolSubmitter {
    /// Create a submitter, creating the spool directory if needed.
    pub async fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn request_path(&self, request: &WorkflowRequest) -> PathBuf {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.6f");
        self.dir.join(format!("workflow-{}-{}.json", request.context, stamp))
    }
}

#[async_trait]
impl SubmissionEngine for SpoolSubmitter {
    async fn submit(&self, request: &WorkflowRequest) -> Result<String> {
        let path = self.request_path(request);
        let json = serde_json::to_string_pretty(request)?;
        fs::write(&path, json.as_bytes()).await?;
        info!("Spooled {} runs to {}", request.runs.len(), path.display());
        Ok(path.display().to_string())
    }
}
