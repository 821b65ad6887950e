//! Stealth and input humanization module
//!
//! This module makes synthetic input look organic:
//! - Randomized pre-click delays
//! - Pixel jitter on click and drag targets
//! - Eased pointer paths instead of teleporting the cursor

pub mod humanize;

pub use humanize::*;

use serde::{Deserialize, Serialize};

/// Configuration for stealth behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StealthConfig {
    /// Sleep a short random time before each click
    pub organic_delays: bool,
    /// Move the pointer along an eased path (desktop only)
    pub organic_moves: bool,
    /// Click jitter in pixels
    pub click_jitter_px: i32,
    /// Scroll start/end jitter in pixels
    pub scroll_jitter_px: i32,
    /// Minimum drag distance for a scroll
    pub scroll_min_px: i32,
    /// Drag duration range in ms
    pub scroll_duration_ms: (u64, u64),
    /// Pause between scroll steps in ms
    pub scroll_pause_ms: (u64, u64),
    /// Hold at the end of a drag to kill inertia, in ms
    pub scroll_end_hold_ms: (u64, u64),
}

impl Default for StealthConfig {
    fn default() -> Self {
        Self {
            organic_delays: true,
            organic_moves: true,
            click_jitter_px: 2,
            scroll_jitter_px: 6,
            scroll_min_px: 30,
            scroll_duration_ms: (160, 260),
            scroll_pause_ms: (30, 70),
            scroll_end_hold_ms: (50, 120),
        }
    }
}

impl StealthConfig {
    /// Create a config with no stealth (for testing)
    pub fn disabled() -> Self {
        Self {
            organic_delays: false,
            organic_moves: false,
            click_jitter_px: 0,
            scroll_jitter_px: 0,
            scroll_min_px: 30,
            scroll_duration_ms: (0, 0),
            scroll_pause_ms: (0, 0),
            scroll_end_hold_ms: (0, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_has_no_jitter() {
        let config = StealthConfig::disabled();
        assert_eq!(config.click_jitter_px, 0);
        assert!(!config.organic_delays);
    }

    #[test]
    fn test_default_scroll_ranges() {
        let config = StealthConfig::default();
        assert_eq!(config.scroll_duration_ms, (160, 260));
        assert_eq!(config.scroll_end_hold_ms, (50, 120));
        assert_eq!(config.scroll_min_px, 30);
    }
}
