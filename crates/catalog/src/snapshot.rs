//! Snapshot catalog implementation.
//!
//! Holds a read-only copy of the run catalog in memory and answers queries by
//! evaluating predicates locally. A snapshot is loaded either from a single
//! JSON file containing an array of runs, or from a directory of per-run
//! `.json` files.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::Path;
use outsource_core::{Document, Field, Matcher, Run};
use tokio::fs;
use tracing::{debug, warn};
use super::{Catalog, CatalogQuery, Result, SortOrder};

/// In-memory catalog over a fixed set of runs.
#[derive(Debug, Clone, Default)]
pub struct SnapshotCatalog {
    runs: Vec<Run>,
}

impl SnapshotCatalog {
    /// Create a catalog from runs. Later duplicates of a run number are
    /// dropped.
    pub fn new(runs: Vec<Run>) -> Self {
        let mut seen = HashSet::new();
        let runs = runs
            .into_iter()
            .filter(|run| {
                let fresh = seen.insert(run.number);
                if !fresh {
                    warn!("Duplicate run {} in snapshot; keeping the first copy", run.number);
                }
                fresh
            })
            .collect();
        Self { runs }
    }

    /// Load a snapshot from a JSON file or a directory of JSON files.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let runs = if fs::metadata(path).await?.is_dir() {
            list_dir(path).await?
        } else {
            let json = fs::read_to_string(path).await?;
            serde_json::from_str(&json)?
        };
        debug!("Loaded {} runs from {}", runs.len(), path.display());
        Ok(Self::new(runs))
    }

    /// Number of runs held.
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether the snapshot holds no runs.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[async_trait::async_trait]
impl Catalog for SnapshotCatalog {
    async fn find(&self, query: &CatalogQuery) -> Result<Vec<Run>> {
        let matcher = Matcher::new(&query.predicate)?;
        let mut found: Vec<&Run> = self.runs.iter().filter(|run| matcher.matches(*run)).collect();

        if let Some((field, order)) = query.sort {
            found.sort_by(|a, b| {
                let ordering = compare_field(*a, *b, field);
                match order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }

        Ok(found
            .into_iter()
            .map(|run| query.projection.apply(run.clone()))
            .collect())
    }
}

/// Order by the first value of `field`; runs lacking it sort first.
fn compare_field(a: &Run, b: &Run, field: Field) -> Ordering {
    let (a, b) = (a.values(field), b.values(field));
    match (a.first(), b.first()) {
        (Some(a), Some(b)) => a.compare(b).unwrap_or(Ordering::Equal),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&json)?)
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        items.push(read_json(&entry.path()).await?);
    }
    Ok(items)
}
