//! Click humanization
//!
//! Optional variance for click positions and settle delays so repeated
//! clicks on the same calibrated point do not land on the exact same pixel
//! with the exact same cadence.

pub mod humanize;

pub use humanize::*;

use serde::{Deserialize, Serialize};

/// Configuration for click humanization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StealthConfig {
    /// Enable humanized settle delays
    pub humanize_timing: bool,
    /// Enable humanized click positions
    pub humanize_position: bool,
    /// Settle delay variance percentage (0-100)
    pub timing_variance_percent: u32,
    /// Maximum click position offset in pixels
    pub position_offset_max: i32,
}

impl Default for StealthConfig {
    fn default() -> Self {
        Self {
            humanize_timing: true,
            humanize_position: true,
            timing_variance_percent: 10,
            position_offset_max: 2,
        }
    }
}

impl StealthConfig {
    /// Create a config with no humanization (for testing)
    pub fn disabled() -> Self {
        Self {
            humanize_timing: false,
            humanize_position: false,
            timing_variance_percent: 0,
            position_offset_max: 0,
        }
    }
}
