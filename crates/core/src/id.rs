//! Run identifiers.

use serde::{Deserialize, Serialize};

/// Unique, monotonically increasing identifier of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunNumber(u32);

impl RunNumber {
    /// Wrap a raw run number.
    pub const fn new(number: u32) -> Self {
        Self(number)
    }

    /// The raw run number.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for RunNumber {
    fn from(number: u32) -> Self {
        Self(number)
    }
}

/// Run ids are rendered zero-padded to six digits, the form they take inside
/// data identifiers.
impl std::fmt::Display for RunNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

impl std::str::FromStr for RunNumber {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}
