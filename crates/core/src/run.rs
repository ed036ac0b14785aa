//! Run model - the unit of work tracked by the catalog.

use serde::{Deserialize, Serialize};
use crate::id::RunNumber;
use crate::Time;

/// Scope prefix of every run-level data identifier.
pub const DID_SCOPE_PREFIX: &str = "xnt_";

/// A snapshot of one run as held by the external catalog.
///
/// Only `number` is mandatory; projected query results leave out the
/// remaining fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Unique run number
    pub number: RunNumber,

    /// Operating-mode label
    #[serde(default)]
    pub mode: Option<String>,

    /// Physical source tag
    #[serde(default)]
    pub source: Option<String>,

    /// Start of data taking
    #[serde(default)]
    pub start: Option<Time>,

    /// Detector subsystems covered by this run
    #[serde(default)]
    pub detectors: Vec<String>,

    /// Free-text labels, including exclusion markers
    #[serde(default)]
    pub tags: Vec<String>,

    /// Known copies of associated data products
    #[serde(default)]
    pub data: Vec<DataRecord>,
}

impl Run {
    /// Create a bare run with only a number.
    pub fn new(number: impl Into<RunNumber>) -> Self {
        Self {
            number: number.into(),
            mode: None,
            source: None,
            start: None,
            detectors: Vec::new(),
            tags: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Set the mode.
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Set the source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set the start time.
    pub fn with_start(mut self, start: Time) -> Self {
        self.start = Some(start);
        self
    }

    /// Add a detector tag.
    pub fn with_detector(mut self, detector: impl Into<String>) -> Self {
        self.detectors.push(detector.into());
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add a data record.
    pub fn with_record(mut self, record: DataRecord) -> Self {
        self.data.push(record);
        self
    }
}

/// One known copy of a data product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    /// Data-product name
    #[serde(rename = "type")]
    pub data_type: String,

    /// Provenance / catalog source
    pub host: String,

    /// Replication status
    pub status: RecordStatus,

    /// Storage-site identifier
    #[serde(default)]
    pub location: Option<String>,

    /// Content/version identifier
    #[serde(default)]
    pub did: Option<String>,
}

impl DataRecord {
    /// Create a record for a product at a host.
    pub fn new(data_type: impl Into<String>, host: impl Into<String>, status: RecordStatus) -> Self {
        Self {
            data_type: data_type.into(),
            host: host.into(),
            status,
            location: None,
            did: None,
        }
    }

    /// Set the storage location.
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the data identifier.
    pub fn with_did(mut self, did: impl Into<String>) -> Self {
        self.did = Some(did.into());
        self
    }

    /// Canonical data identifier of `product` for `run` produced by code
    /// with lineage hash `hash`.
    pub fn did_for(run: RunNumber, product: &str, hash: &str) -> String {
        format!("{}{}:{}-{}", DID_SCOPE_PREFIX, run, product, hash)
    }
}

/// Replication status of a data record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecordStatus {
    /// Registered, not yet copied
    Pending,
    /// Copy in progress
    Transferring,
    /// Copy complete
    Transferred,
    /// Copy errored
    Error,
    /// Copy failed permanently
    Failed,
    /// Any other catalog status
    Other(String),
}

impl RecordStatus {
    /// Catalog spelling of the status.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Transferring => "transferring",
            Self::Transferred => "transferred",
            Self::Error => "error",
            Self::Failed => "failed",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for RecordStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => Self::Pending,
            "transferring" => Self::Transferring,
            "transferred" => Self::Transferred,
            "error" => Self::Error,
            "failed" => Self::Failed,
            _ => Self::Other(s),
        }
    }
}

impl From<RecordStatus> for String {
    fn from(status: RecordStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
