//! Detector subsystems and their static processing specs.

use serde::{Deserialize, Serialize};

/// A detector subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detector {
    /// Time projection chamber
    Tpc,
    /// Neutron veto
    NeutronVeto,
    /// Muon veto
    MuonVeto,
}

impl Detector {
    /// Every known subsystem, in resolution order.
    pub const ALL: [Detector; 3] = [Detector::Tpc, Detector::NeutronVeto, Detector::MuonVeto];

    /// Tag used for this subsystem in a run's `detectors` list.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tpc => "tpc",
            Self::NeutronVeto => "neutron_veto",
            Self::MuonVeto => "muon_veto",
        }
    }
}

impl std::fmt::Display for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Detector {
    type Err = UnknownDetector;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tpc" => Ok(Self::Tpc),
            "neutron_veto" => Ok(Self::NeutronVeto),
            "muon_veto" => Ok(Self::MuonVeto),
            other => Err(UnknownDetector(other.to_string())),
        }
    }
}

/// A subsystem name outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown detector '{0}' (expected one of: all, tpc, neutron_veto, muon_veto)")]
pub struct UnknownDetector(pub String);

/// Which subsystems a resolution pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectorSelection {
    /// Every configured subsystem
    #[default]
    All,
    /// A single subsystem
    One(Detector),
}

impl DetectorSelection {
    /// Whether `detector` is in scope.
    pub fn includes(self, detector: Detector) -> bool {
        match self {
            Self::All => true,
            Self::One(d) => d == detector,
        }
    }
}

impl std::str::FromStr for DetectorSelection {
    type Err = UnknownDetector;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            other => Ok(Self::One(other.parse()?)),
        }
    }
}

impl std::fmt::Display for DetectorSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::One(d) => f.write_str(d.as_str()),
        }
    }
}

/// Static processing configuration of one subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsystemSpec {
    /// Name of the raw data product
    pub raw_type: String,

    /// Derived products eligible for outsourcing, in processing order
    pub to_process: Vec<String>,

    /// Key of the calibration model that gates run eligibility
    pub calibration_model_key: String,
}
