//! User settings
//!
//! Defines all configurable options for the automation. Every section has a
//! `Default`, and missing JSON fields fall back to it, so a settings file only
//! needs to name what it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::stealth::StealthConfig;

/// Main settings structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Capture/input backend
    pub controller: ControllerSettings,
    /// Remote detection and OCR services
    pub perception: PerceptionSettings,
    /// Career loop orchestration
    pub career: CareerSettings,
    /// Support card selection
    pub support: SupportSettings,
    /// Poll-and-click primitive
    pub waiter: WaiterSettings,
    /// Input humanization
    pub stealth: StealthConfig,
}

impl Settings {
    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write settings as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), raw)?;
        Ok(())
    }

    /// Settings for a device reached over ADB
    pub fn adb_preset(device: &str) -> Self {
        Self {
            controller: ControllerSettings {
                kind: ControllerKind::Adb,
                adb_device: device.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Settings for a device mirrored over a persistent frame stream
    pub fn mirror_preset(device: &str) -> Self {
        Self {
            controller: ControllerSettings {
                kind: ControllerKind::Mirror,
                adb_device: device.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Which controller variant drives the game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerKind {
    /// A desktop window captured and clicked in screen space
    Desktop,
    /// An Android device driven through bridge shell commands
    Adb,
    /// ADB plus a persistent frame stream for low-latency capture
    Mirror,
}

/// How the desktop controller scrolls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollMode {
    /// Press, drag, hold, release
    Drag,
    /// Mouse wheel notches
    Wheel,
}

/// Controller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    pub kind: ControllerKind,
    /// Window title to look for (desktop)
    pub window_title: String,
    /// Capture only the client area instead of the whole window
    pub capture_client_only: bool,
    /// Default captures use the left half of the client area
    pub capture_left_half: bool,
    /// Process names tried, in order, when no title/class matches
    pub process_hints: Vec<String>,
    pub scroll_mode: ScrollMode,
    /// Device serial, or `host:port` for network devices
    pub adb_device: String,
    /// Explicit bridge executable; `ADB_EXEC` wins over this
    pub adb_executable: Option<String>,
    pub command_timeout_ms: u64,
    pub command_retries: u32,
    pub retry_delay_ms: u64,
    /// A mirrored frame older than this is stale
    pub stale_frame_ms: u64,
    pub watchdog_interval_ms: u64,
    /// How long a fresh stream may take to deliver its first frame
    pub stream_start_timeout_ms: u64,
    /// Mirror through an H.264 screen recording decoded by ffmpeg when
    /// ffmpeg is available; otherwise a `screencap` loop is used
    pub mirror_video: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            kind: ControllerKind::Desktop,
            window_title: "Umamusume".to_string(),
            capture_client_only: true,
            capture_left_half: false,
            process_hints: vec![
                "UmamusumePretty".to_string(),
                "Umamusume".to_string(),
                "steam".to_string(),
                "proton".to_string(),
                "wine".to_string(),
            ],
            scroll_mode: ScrollMode::Drag,
            adb_device: "localhost:5555".to_string(),
            adb_executable: None,
            command_timeout_ms: 10_000,
            command_retries: 2,
            retry_delay_ms: 1000,
            stale_frame_ms: 1000,
            watchdog_interval_ms: 1000,
            stream_start_timeout_ms: 5000,
            mirror_video: true,
        }
    }
}

/// Perception service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionSettings {
    /// Base URL of the detection/OCR service
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub imgsz: u32,
    pub conf: f32,
    pub iou: f32,
    /// Weights the service should use, if it hosts several
    pub weights_path: Option<String>,
    /// Agent label sent with each request
    pub agent: String,
    /// Where low-confidence frames are stored; disabled when `None`
    pub debug_dir: Option<String>,
    /// Frames whose best detection is below this are stored
    pub debug_conf_below: f32,
}

impl Default for PerceptionSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8001".to_string(),
            request_timeout_ms: 15_000,
            imgsz: 832,
            conf: 0.51,
            iou: 0.45,
            weights_path: None,
            agent: "career_loop".to_string(),
            debug_dir: None,
            debug_conf_below: 0.6,
        }
    }
}

/// Career loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CareerSettings {
    /// Maximum careers to run (0 = unlimited)
    pub max_careers: u32,
    /// Stop after this many consecutive failed cycles
    pub error_threshold: u32,
    /// Attempts per cycle before it is recorded as failed
    pub cycle_attempts: u32,
    /// Backoff between cycle attempts (ms)
    pub retry_backoff_ms: u64,
    /// Cap on setup screens walked before support selection
    pub setup_max_screens: u32,
    /// Cap on dialog clicks after a career finishes
    pub completion_max_clicks: u32,
    /// Max vertical-center distance (px) between a resource icon and its Use button
    pub use_button_y_tolerance: f32,
    pub navigation_timeout_ms: u64,
    pub transition_timeout_ms: u64,
    /// Command line of the training agent process
    pub agent_command: Vec<String>,
}

impl Default for CareerSettings {
    fn default() -> Self {
        Self {
            max_careers: 0,
            error_threshold: 5,
            cycle_attempts: 3,
            retry_backoff_ms: 2000,
            setup_max_screens: 10,
            completion_max_clicks: 20,
            use_button_y_tolerance: 100.0,
            navigation_timeout_ms: 5000,
            transition_timeout_ms: 4000,
            agent_command: Vec::new(),
        }
    }
}

/// Support card selection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportSettings {
    pub preferred_name: String,
    pub preferred_level: u32,
    pub max_refresh_attempts: u32,
    /// Settle time after a refresh (ms)
    pub refresh_wait_ms: u64,
    /// Minimum fuzzy name ratio for a match
    pub name_threshold: f32,
    pub popup_timeout_ms: u64,
    pub scan_timeout_ms: u64,
}

impl Default for SupportSettings {
    fn default() -> Self {
        Self {
            preferred_name: "Riko Kashimoto".to_string(),
            preferred_level: 50,
            max_refresh_attempts: 3,
            refresh_wait_ms: 5000,
            name_threshold: 0.70,
            popup_timeout_ms: 4000,
            scan_timeout_ms: 3000,
        }
    }
}

/// Waiter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaiterSettings {
    /// Delay between perception polls (ms)
    pub poll_interval_ms: u64,
    /// Fuzzy threshold when a query gives none
    pub default_threshold: f32,
}

impl Default for WaiterSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            default_threshold: 0.68,
        }
    }
}
