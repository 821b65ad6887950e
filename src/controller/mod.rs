//! Capture and input controllers
//!
//! A [`Controller`] captures frames from a target (a desktop window or an
//! Android device) and synthesizes input against it. Detections are found in
//! frame-local pixels; every controller remembers where its last frame came
//! from so those pixels can be mapped back to its own input space.

pub mod adb;
pub mod command;
pub mod desktop;
pub mod mirror;
#[cfg(windows)]
mod win32;
pub mod window;

use std::time::Duration;

use image::RgbImage;

use crate::config::{ControllerKind, Settings};
use crate::geometry::{BBox, Region};
use crate::stealth::StealthConfig;

pub use adb::AdbController;
pub use desktop::DesktopController;
pub use mirror::MirrorController;

/// Controller errors
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Window not found: {0}")]
    WindowNotFound(String),
    #[error("Command `{command}` failed with exit code {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("Command `{0}` timed out after {1:?}")]
    CommandTimeout(String, Duration),
    #[error("ADB executable not found")]
    BridgeNotFound,
    #[error("Screen capture failed: {0}")]
    Capture(String),
    #[error("Input synthesis failed: {0}")]
    Input(String),
    #[error("Failed to decode frame: {0}")]
    Decode(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-controller mutable state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerState {
    /// Window title the controller targets, if any
    pub window_title: Option<String>,
    /// Capture only the client area of the target window
    pub capture_client_only: bool,
    /// Offset of the last captured frame in input space
    pub last_origin: (i32, i32),
    /// Rectangle of the last captured frame in input space
    pub last_bbox: Option<Region>,
}

impl ControllerState {
    pub fn new(window_title: Option<String>, capture_client_only: bool) -> Self {
        Self {
            window_title,
            capture_client_only,
            ..Default::default()
        }
    }

    /// Record where the frame just captured sits in input space
    pub fn record_capture(&mut self, region: Region) {
        self.last_origin = (region.left, region.top);
        self.last_bbox = Some(region);
    }

    /// Forget the previous frame after a capture of `requested` failed, so
    /// its detections can no longer be mapped through a stale origin
    pub fn record_failed_capture(&mut self, requested: Region) {
        self.last_origin = (requested.left, requested.top);
        self.last_bbox = None;
    }
}

/// Options for a click
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickOptions {
    pub clicks: u32,
    /// Jitter override in pixels; `None` uses the stealth setting
    pub jitter: Option<i32>,
    /// Gap between repeated clicks
    pub interval: Duration,
}

impl Default for ClickOptions {
    fn default() -> Self {
        Self {
            clicks: 1,
            jitter: None,
            interval: Duration::from_millis(150),
        }
    }
}

impl ClickOptions {
    pub fn times(clicks: u32) -> Self {
        Self {
            clicks: clicks.max(1),
            ..Default::default()
        }
    }

    pub fn with_jitter(mut self, jitter: i32) -> Self {
        self.jitter = Some(jitter);
        self
    }
}

/// What to scroll by
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollTarget {
    /// Signed distance in pixels; negative scrolls down
    Delta(i32),
    /// Scroll by the height of a frame-local box, starting from its center
    Box(BBox),
}

/// Options for a scroll gesture
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollOptions {
    pub steps: u32,
    /// Direction for [`ScrollTarget::Box`]
    pub default_down: bool,
    /// Flip the direction
    pub invert: bool,
    pub min_px: i32,
    pub jitter: i32,
    pub duration_ms: (u64, u64),
    pub pause_ms: (u64, u64),
    pub end_hold_ms: (u64, u64),
    /// Cap a single drag at this share of the screen height (devices)
    pub max_pixels_ratio: Option<f32>,
}

impl Default for ScrollOptions {
    fn default() -> Self {
        Self::from_stealth(&StealthConfig::default())
    }
}

impl ScrollOptions {
    pub fn from_stealth(stealth: &StealthConfig) -> Self {
        Self {
            steps: 1,
            default_down: true,
            invert: false,
            min_px: stealth.scroll_min_px,
            jitter: stealth.scroll_jitter_px,
            duration_ms: stealth.scroll_duration_ms,
            pause_ms: stealth.scroll_pause_ms,
            end_hold_ms: stealth.scroll_end_hold_ms,
            max_pixels_ratio: Some(0.35),
        }
    }
}

/// Planned drag for one scroll step, before jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragPlan {
    pub x: i32,
    pub y_start: i32,
    pub y_end: i32,
}

/// Work out a vertical drag inside `area` (input space).
///
/// `center` is the gesture anchor for box targets (already in input space).
/// Returns `None` when the area is empty.
pub fn plan_drag(
    area: Region,
    target: ScrollTarget,
    center: Option<(i32, i32)>,
    opts: &ScrollOptions,
) -> Option<DragPlan> {
    if area.is_empty() {
        return None;
    }
    let (cx, cy, mut pixels, mut down) = match target {
        ScrollTarget::Box(b) => {
            let (cx, cy) = center.unwrap_or_else(|| {
                let (x, y) = b.center();
                (x as i32, y as i32)
            });
            (cx, cy, opts.min_px.max(b.height().abs() as i32), opts.default_down)
        }
        ScrollTarget::Delta(delta) => (
            area.left + area.width as i32 / 2,
            area.top + area.height as i32 / 2,
            opts.min_px.max(delta.abs()),
            delta < 0,
        ),
    };
    if opts.invert {
        down = !down;
    }
    if let Some(ratio) = opts.max_pixels_ratio.filter(|r| *r > 0.0) {
        let cap = opts.min_px.max((area.height as f32 * ratio) as i32);
        pixels = pixels.min(cap);
    }

    let lo = area.top + 10;
    let hi = (area.bottom() - 10).max(lo);
    let clamp_y = |y: i32| y.clamp(lo, hi);
    let half = pixels / 2;
    // Scrolling down drags the content upwards.
    let (y_start, y_end) = if down {
        (clamp_y(cy + half), clamp_y(cy - half))
    } else {
        (clamp_y(cy - half), clamp_y(cy + half))
    };
    Some(DragPlan {
        x: cx,
        y_start,
        y_end,
    })
}

/// Capture and input capability shared by every backend
pub trait Controller {
    /// Short backend label for logs
    fn name(&self) -> &'static str;

    fn state(&self) -> &ControllerState;

    /// Bring the target to the foreground, restoring it if minimized.
    /// Best-effort: "not found" is reported as `false`, never as an error.
    fn focus(&mut self) -> bool;

    /// Capture `region` (absolute, input space), or the target itself when
    /// `None`. Always updates the last origin/bbox before returning.
    fn screenshot(&mut self, region: Option<Region>) -> Result<RgbImage, ControllerError>;

    /// Click at absolute input-space coordinates
    fn click(&mut self, x: i32, y: i32, opts: ClickOptions) -> Result<(), ControllerError>;

    fn mouse_down(&mut self, x: i32, y: i32) -> Result<(), ControllerError>;

    fn mouse_up(&mut self, x: i32, y: i32) -> Result<(), ControllerError>;

    /// Press at a point for `duration`
    fn hold(&mut self, x: i32, y: i32, duration: Duration) -> Result<(), ControllerError>;

    /// Vertical scroll gesture. Returns `false` if nothing could be scrolled.
    fn scroll(&mut self, target: ScrollTarget, opts: &ScrollOptions)
        -> Result<bool, ControllerError>;

    /// Region the waiter captures by default; `None` means the whole target
    fn default_capture_region(&mut self) -> Option<Region> {
        None
    }

    /// Map a point of the last frame into input space
    fn to_screen(&self, x: f32, y: f32) -> (i32, i32) {
        let (ox, oy) = self.state().last_origin;
        (ox + x.round() as i32, oy + y.round() as i32)
    }

    /// Click the center of a box from the last frame
    fn click_bbox(&mut self, bbox: &BBox, clicks: u32) -> Result<(), ControllerError> {
        let (lx, ly) = bbox.click_point();
        let (ox, oy) = self.state().last_origin;
        self.click(ox + lx, oy + ly, ClickOptions::times(clicks))
    }
}

/// Build the controller named by the settings
pub fn build(settings: &Settings) -> Result<Box<dyn Controller>, ControllerError> {
    let cfg = &settings.controller;
    let controller: Box<dyn Controller> = match cfg.kind {
        ControllerKind::Desktop => Box::new(DesktopController::new(cfg, settings.stealth.clone())?),
        ControllerKind::Adb => Box::new(AdbController::connect(cfg, settings.stealth.clone())?),
        ControllerKind::Mirror => Box::new(MirrorController::start(cfg, settings.stealth.clone())?),
    };
    log::info!("[Controller] using {} backend", controller.name());
    Ok(controller)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_capture_updates_origin() {
        let mut state = ControllerState::new(Some("Game".into()), true);
        state.record_capture(Region::new(100, 40, 800, 600));
        assert_eq!(state.last_origin, (100, 40));
        assert_eq!(state.last_bbox, Some(Region::new(100, 40, 800, 600)));

        state.record_failed_capture(Region::new(5000, 5000, 10, 10));
        assert_eq!(state.last_origin, (5000, 5000));
        assert_eq!(state.last_bbox, None);
    }

    #[test]
    fn test_plan_drag_delta_direction() {
        let area = Region::new(0, 0, 1080, 1920);
        let opts = ScrollOptions {
            max_pixels_ratio: None,
            ..Default::default()
        };

        let down = plan_drag(area, ScrollTarget::Delta(-200), None, &opts).unwrap();
        assert_eq!(down, DragPlan { x: 540, y_start: 1060, y_end: 860 });

        let up = plan_drag(area, ScrollTarget::Delta(200), None, &opts).unwrap();
        assert_eq!(up, DragPlan { x: 540, y_start: 860, y_end: 1060 });

        let inverted = ScrollOptions {
            invert: true,
            ..opts.clone()
        };
        let flipped = plan_drag(area, ScrollTarget::Delta(-200), None, &inverted).unwrap();
        assert_eq!(flipped, up);
    }

    #[test]
    fn test_plan_drag_clamps_and_minimum() {
        let area = Region::new(100, 100, 400, 300);
        let opts = ScrollOptions {
            max_pixels_ratio: None,
            ..Default::default()
        };

        // tiny delta is raised to the minimum distance
        let small = plan_drag(area, ScrollTarget::Delta(-4), None, &opts).unwrap();
        assert_eq!(small.y_start - small.y_end, 30);

        // huge delta is clamped to 10px inside the area
        let big = plan_drag(area, ScrollTarget::Delta(-5000), None, &opts).unwrap();
        assert_eq!(big.y_start, 390);
        assert_eq!(big.y_end, 110);
    }

    #[test]
    fn test_plan_drag_box_uses_height_and_ratio_cap() {
        let area = Region::new(0, 0, 1000, 1000);
        let b = BBox::new(100.0, 300.0, 300.0, 900.0);
        let opts = ScrollOptions::default();

        let plan = plan_drag(area, ScrollTarget::Box(b), Some((200, 600)), &opts).unwrap();
        // 600px box capped to 35% of 1000
        assert_eq!(plan.y_start - plan.y_end, 350);
        assert_eq!(plan.x, 200);
    }

    #[test]
    fn test_plan_drag_empty_area() {
        let opts = ScrollOptions::default();
        assert!(plan_drag(Region::new(0, 0, 0, 10), ScrollTarget::Delta(10), None, &opts).is_none());
    }
}
