//! outsource - selects runs ready for reprocessing and hands them to the
//! workflow submission engine.

mod args;

use std::path::{Path, PathBuf};
use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use outsource_catalog::SnapshotCatalog;
use outsource_selection::{
    CapPolicy, HandoffFlags, OutsourceConfig, ReadinessResolver, SelectionError, SelectionReport,
    SpoolSubmitter, SubmissionEngine, WorkflowRequest,
};

const DEFAULT_CONFIG: &str = "outsource.json";

#[derive(Parser, Debug)]
#[command(name = "outsource")]
#[command(about = "Select runs ready for reprocessing and submit them", long_about = None)]
pub struct Cli {
    /// Processing context identifier
    #[arg(long)]
    pub context: String,

    /// Configuration file (defaults to ./outsource.json if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Run catalog snapshot: a JSON array of runs or a directory of run files
    #[arg(long, default_value = "runs.json")]
    pub catalog: PathBuf,

    /// Verbose logging; jobs will not update the catalog or upload outputs
    #[arg(long)]
    pub debug: bool,

    /// Reprocess even if outputs exist
    #[arg(long)]
    pub force: bool,

    /// Resolve and print the worklist without submitting
    #[arg(long)]
    pub dry_run: bool,

    /// Detector subsystem: all, tpc, neutron_veto or muon_veto
    #[arg(long, default_value = "all")]
    pub detector: String,

    /// Lowest run number to consider
    #[arg(long)]
    pub from: Option<u32>,

    /// Highest run number to consider
    #[arg(long)]
    pub to: Option<u32>,

    /// Restrict to these operating modes
    #[arg(long, num_args = 1..)]
    pub mode: Vec<String>,

    /// Restrict to these runs
    #[arg(long, num_args = 1..)]
    pub run: Vec<u32>,

    /// File of run numbers to restrict to
    #[arg(long)]
    pub runlist: Option<PathBuf>,

    /// Restrict to these calibration sources
    #[arg(long, num_args = 1..)]
    pub source: Vec<String>,

    /// Cap on rows per capped tier query
    #[arg(long)]
    pub limit: Option<usize>,

    /// Which tiers the limit applies to
    #[arg(long, value_enum)]
    pub cap_policy: Option<CapPolicy>,

    /// Spool directory for workflow requests
    #[arg(long, default_value = "spool")]
    pub spool: PathBuf,
}

fn init_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let constraints = args::constraints(&cli).await?;

    let config = OutsourceConfig::load(cli.config.as_deref(), Path::new(DEFAULT_CONFIG)).await?;
    config.context(&cli.context)?;

    if cli.debug {
        warn!("Debug mode: jobs will not update the catalog or upload outputs");
    }

    let catalog = SnapshotCatalog::open(&cli.catalog).await?;
    info!("Loaded {} runs from {}", catalog.len(), cli.catalog.display());

    let mut resolver = ReadinessResolver::new(catalog, config, cli.context.clone())?;
    if let Some(cap_policy) = cli.cap_policy {
        resolver = resolver.with_cap_policy(cap_policy);
    }

    let report = match resolver.resolve(&constraints).await {
        Ok(report) => report,
        Err(SelectionError::EmptyResult(reason)) if cli.dry_run => {
            println!("{}", reason);
            println!("0 runs");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if cli.dry_run {
        print_worklist(&report);
        return Ok(());
    }

    let request = WorkflowRequest::from_report(
        &report,
        resolver.config(),
        resolver.context_name(),
        resolver.context(),
        HandoffFlags::new(cli.force, cli.debug),
    );
    let submitter = SpoolSubmitter::new(&cli.spool).await?;
    let handle = submitter.submit(&request).await?;
    println!("Submitted {} runs: {}", request.runs.len(), handle);

    Ok(())
}

fn print_worklist(report: &SelectionReport) {
    println!("{} runs", report.worklist.len());
    if let Some((first, last)) = report.bounds() {
        println!("  Range: {} .. {}", first, last);
    }
    for number in report.sorted_runs() {
        let Some(run) = report.runs.get(&number) else {
            continue;
        };
        println!(
            "  {} | {} | {} | {}",
            run.number,
            run.mode.as_deref().unwrap_or("-"),
            run.detectors.join(","),
            run.missing_products.join(" "),
        );
    }
    if let Some(partial) = &report.partial_request {
        println!("Warning: {}", partial);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_is_required() {
        assert!(Cli::try_parse_from(["outsource", "--dry-run"]).is_err());
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["outsource", "--context", "online"]).unwrap();
        assert_eq!(cli.detector, "all");
        assert_eq!(cli.catalog, PathBuf::from("runs.json"));
        assert!(!cli.debug && !cli.force && !cli.dry_run);
        assert!(cli.run.is_empty());
        assert!(cli.cap_policy.is_none());
    }

    #[test]
    fn test_cap_policy_flag() {
        let cli = Cli::try_parse_from(["outsource", "--context", "online", "--cap-policy", "per_tier"]).unwrap();
        assert_eq!(cli.cap_policy, Some(CapPolicy::PerTier));
        assert!(Cli::try_parse_from(["outsource", "--context", "online", "--cap-policy", "sometimes"]).is_err());
    }

    #[test]
    fn test_multi_value_flags() {
        let cli = Cli::try_parse_from([
            "outsource", "--context", "online", "--mode", "a", "b", "--source", "none", "--debug",
        ])
        .unwrap();
        assert_eq!(cli.mode, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(cli.source, vec!["none".to_string()]);
        assert!(cli.debug);
    }
}
