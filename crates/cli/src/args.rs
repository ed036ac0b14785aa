//! Translation of command-line flags into selection constraints.

use std::path::Path;
use outsource_core::{DetectorSelection, RunNumber, SelectionConstraints};
use outsource_selection::{Result, SelectionError};
use tokio::fs;
use crate::Cli;

/// Build the constraints for one pass. Fails before any catalog access on
/// conflicting flags.
pub async fn constraints(cli: &Cli) -> Result<SelectionConstraints> {
    if !cli.run.is_empty() && cli.runlist.is_some() {
        return Err(SelectionError::config("--run and --runlist are mutually exclusive"));
    }

    let detector: DetectorSelection = cli.detector.parse()?;

    let runs = match &cli.runlist {
        Some(path) => Some(read_runlist(path).await?),
        None if !cli.run.is_empty() => Some(cli.run.iter().copied().map(RunNumber::new).collect()),
        None => None,
    };

    if let (Some(from), Some(to)) = (cli.from, cli.to) {
        if from > to {
            return Err(SelectionError::config(format!("--from {} is greater than --to {}", from, to)));
        }
    }

    let mut constraints = SelectionConstraints::new()
        .with_range(cli.from.map(RunNumber::new), cli.to.map(RunNumber::new))
        .with_modes(cli.mode.clone())
        .with_sources(cli.source.clone())
        .with_detector(detector);
    if let Some(runs) = runs {
        constraints = constraints.with_runs(runs);
    }
    if let Some(limit) = cli.limit {
        constraints = constraints.with_limit(limit);
    }
    Ok(constraints)
}

async fn read_runlist(path: &Path) -> Result<Vec<RunNumber>> {
    let text = fs::read_to_string(path).await.map_err(|e| {
        SelectionError::config(format!("cannot read runlist {}: {}", path.display(), e))
    })?;
    parse_runlist(&text)
}

/// Parse whitespace-separated run numbers; `#` starts a comment.
pub fn parse_runlist(text: &str) -> Result<Vec<RunNumber>> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .flat_map(str::split_whitespace)
        .map(|token| {
            token
                .parse::<RunNumber>()
                .map_err(|_| SelectionError::config(format!("invalid run number '{}' in runlist", token)))
        })
        .collect()
}
