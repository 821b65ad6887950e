//! Value types shared by the career flows

use std::fmt;
use std::time::Instant;

use crate::geometry::BBox;
use crate::perception::Detection;

/// Setup screen between the main menu and the start of a career
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CareerStep {
    ScenarioSelect,
    TraineeSelect,
    LegacySelect,
    SupportFormation,
    Unknown,
}

impl CareerStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            CareerStep::ScenarioSelect => "scenario_select",
            CareerStep::TraineeSelect => "trainee_select",
            CareerStep::LegacySelect => "legacy_select",
            CareerStep::SupportFormation => "support_formation",
            CareerStep::Unknown => "unknown",
        }
    }

    /// Classify the OCR'd text of the step indicator by keyword
    pub fn from_indicator_text(text: &str) -> Self {
        let text = text.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| text.contains(w));
        if has(&["scenario"]) {
            CareerStep::ScenarioSelect
        } else if has(&["trainee", "umamusume"]) {
            CareerStep::TraineeSelect
        } else if has(&["legacy", "inherit"]) {
            CareerStep::LegacySelect
        } else if has(&["support", "formation"]) {
            CareerStep::SupportFormation
        } else {
            CareerStep::Unknown
        }
    }
}

impl fmt::Display for CareerStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A support card read off the borrow popup during one scan
#[derive(Debug, Clone, PartialEq)]
pub struct SupportCardInfo {
    pub name: String,
    /// 1..=50
    pub level: u32,
    pub xyxy: BBox,
    pub container: Detection,
}

impl SupportCardInfo {
    /// Case-insensitive name equality and exact level equality
    pub fn matches_criteria(&self, name: &str, level: u32) -> bool {
        self.level == level && self.name.to_lowercase() == name.to_lowercase()
    }
}

/// Runtime bookkeeping of the career loop
#[derive(Debug, Clone, Default)]
pub struct CareerLoopState {
    pub total_careers_completed: u32,
    pub current_career_start: Option<Instant>,
    pub last_error: Option<String>,
    pub consecutive_errors: u32,
    pub is_running: bool,
}

impl CareerLoopState {
    pub fn start_career(&mut self) {
        self.current_career_start = Some(Instant::now());
    }

    pub fn record_success(&mut self) {
        self.total_careers_completed += 1;
        self.consecutive_errors = 0;
        self.last_error = None;
        self.current_career_start = None;
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.consecutive_errors += 1;
        self.last_error = Some(error.into());
        self.current_career_start = None;
    }
}
