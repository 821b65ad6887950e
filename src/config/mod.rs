//! Configuration module
//!
//! Handles user settings: which controller to drive, where perception lives,
//! and the knobs of the career loop and its flows.

pub mod settings;

pub use settings::{
    CareerSettings, ControllerKind, ControllerSettings, PerceptionSettings, ScrollMode, Settings,
    SupportSettings, WaiterSettings,
};

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}
