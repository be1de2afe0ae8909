//! Player configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Native tick rate of every attached chip. Wait commands count ticks at this rate.
pub const CHIP_SAMPLE_RATE: u32 = 44_100;

/// Default playback cap: three minutes.
pub const DEFAULT_MAX_DURATION_MS: u32 = 3 * 60 * 1000;

/// Default chip volume; 64 is unity gain for the built-in chips.
pub const DEFAULT_VOLUME: u16 = 64;

/// Default number of instructions a single subroutine call may execute.
pub const DEFAULT_INSTRUCTION_BUDGET: u32 = 20_000;

/// Runtime configuration for a [`Player`](crate::Player).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use vgm_replayer::ReplayerConfig;
/// let cfg = ReplayerConfig::from_json_str(r#"{ "sample_rate": 22050 }"#).unwrap();
/// assert_eq!(cfg.sample_rate, 22050);
/// assert_eq!(cfg.volume, 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayerConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Playback cap in milliseconds (0 = unlimited).
    pub max_duration_ms: u32,
    /// Chip volume level.
    pub volume: u16,
    /// Instruction budget for each init/play subroutine call.
    pub instruction_budget: u32,
}

impl Default for ReplayerConfig {
    fn default() -> Self {
        Self {
            sample_rate: CHIP_SAMPLE_RATE,
            max_duration_ms: DEFAULT_MAX_DURATION_MS,
            volume: DEFAULT_VOLUME,
            instruction_budget: DEFAULT_INSTRUCTION_BUDGET,
        }
    }
}

impl ReplayerConfig {
    /// Parse a configuration from JSON text. Missing fields take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Duration cap converted to chip ticks, `None` when unlimited.
    pub fn max_duration_ticks(&self) -> Option<u64> {
        duration_to_ticks(self.max_duration_ms)
    }
}

/// Convert a millisecond cap to chip ticks; 0 means unlimited.
pub(crate) fn duration_to_ticks(milliseconds: u32) -> Option<u64> {
    if milliseconds == 0 {
        None
    } else {
        Some(milliseconds as u64 * CHIP_SAMPLE_RATE as u64 / 1000)
    }
}
