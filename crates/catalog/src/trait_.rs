//! Catalog trait abstraction.

use async_trait::async_trait;
use outsource_core::{Field, Predicate, PredicateError, Run};
use serde_json::json;

/// Error type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors that can occur while querying the catalog.
///
/// Every variant is a query execution failure; an empty result set is
/// reported as `Ok(vec![])`, never as an error.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The query cannot be executed as written
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] PredicateError),

    /// The catalog could not be reached
    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Which parts of each run a query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    /// Every field, including data records
    #[default]
    Full,
    /// Identity and administrative fields only; no tags or data records
    Summary,
}

impl Projection {
    /// Apply the projection to a full run.
    pub fn apply(self, mut run: Run) -> Run {
        if self == Self::Summary {
            run.tags.clear();
            run.data.clear();
        }
        run
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first
    Ascending,
    /// Largest first
    Descending,
}

/// A single `find` call.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogQuery {
    /// Filter
    pub predicate: Predicate,
    /// Returned fields
    pub projection: Projection,
    /// Maximum number of runs returned
    pub limit: Option<usize>,
    /// Result ordering
    pub sort: Option<(Field, SortOrder)>,
}

impl CatalogQuery {
    /// Create a query returning every matching run in full.
    pub fn new(predicate: Predicate) -> Self {
        Self {
            predicate,
            projection: Projection::Full,
            limit: None,
            sort: None,
        }
    }

    /// Set the projection.
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    /// Cap the result count.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Order results.
    pub fn sorted_by(mut self, field: Field, order: SortOrder) -> Self {
        self.sort = Some((field, order));
        self
    }

    /// Render as a document for logging.
    pub fn to_document(&self) -> serde_json::Value {
        let sort = self.sort.map(|(field, order)| {
            let direction = match order {
                SortOrder::Ascending => 1,
                SortOrder::Descending => -1,
            };
            let mut doc = serde_json::Map::new();
            doc.insert(field.path().to_string(), json!(direction));
            serde_json::Value::Object(doc)
        });
        json!({
            "filter": self.predicate.to_document(),
            "projection": match self.projection {
                Projection::Full => "full",
                Projection::Summary => "summary",
            },
            "limit": self.limit,
            "sort": sort,
        })
    }
}

/// Read-only access to the run catalog.
///
/// Implementations are injected into the query planner, so tests can
/// substitute their own.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Return the runs matching `query`.
    async fn find(&self, query: &CatalogQuery) -> Result<Vec<Run>>;
}

#[async_trait]
impl<C: Catalog + ?Sized> Catalog for std::sync::Arc<C> {
    async fn find(&self, query: &CatalogQuery) -> Result<Vec<Run>> {
        (**self).find(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outsource_core::{DataRecord, RecordStatus};

    #[test]
    fn test_summary_projection_drops_records() {
        let run = Run::new(7u32)
            .with_tag("bad")
            .with_record(DataRecord::new("raw_records", "rucio-catalogue", RecordStatus::Pending));
        let projected = Projection::Summary.apply(run.clone());
        assert!(projected.tags.is_empty());
        assert!(projected.data.is_empty());
        assert_eq!(Projection::Full.apply(run.clone()), run);
    }

    #[test]
    fn test_query_document() {
        let query = CatalogQuery::new(Predicate::eq(Field::Mode, "tpc_bkg"))
            .with_projection(Projection::Summary)
            .with_limit(Some(10))
            .sorted_by(Field::Number, SortOrder::Descending);
        let doc = query.to_document();
        assert_eq!(doc["filter"], json!({ "mode": "tpc_bkg" }));
        assert_eq!(doc["sort"], json!({ "number": -1 }));
        assert_eq!(doc["limit"], json!(10));
    }
}
