//! Calibration validity windows.

use serde::{Deserialize, Serialize};
use crate::Time;

/// Half-open interval `[start, end)` during which one calibration model
/// version is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationWindow {
    /// First instant covered
    pub start: Time,
    /// First instant no longer covered
    pub end: Time,
}

impl CalibrationWindow {
    /// Create a window.
    pub fn new(start: Time, end: Time) -> Self {
        Self { start, end }
    }

    /// Whether `t` falls inside the window.
    pub fn contains(&self, t: Time) -> bool {
        self.start <= t && t < self.end
    }

    /// Whether the window covers no instant at all.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}
