//! Desktop window controller
//!
//! Captures a game window's client area with `xcap` and drives it with
//! `enigo` at absolute screen coordinates. Works for native windows, games
//! under Wine/Proton, and a mirroring window showing an Android device.

use std::thread;
use std::time::Duration;

use enigo::{Axis, Button, Coordinate, Direction, Enigo, Mouse, Settings as EnigoSettings};
use image::{DynamicImage, RgbImage};

use super::window::{self, WindowInfo};
use super::{
    plan_drag, ClickOptions, Controller, ControllerError, ControllerState, ScrollOptions,
    ScrollTarget,
};
use crate::config::{ControllerSettings, ScrollMode};
use crate::geometry::Region;
use crate::stealth::{eased_path, Humanizer, StealthConfig};

/// Steps in an eased pointer move
const MOVE_STEPS: u32 = 12;

/// Wheel notches per pixel of a box-height scroll
const PIXELS_PER_NOTCH: i32 = 40;

/// Controller for a window on the local desktop
pub struct DesktopController {
    state: ControllerState,
    process_hints: Vec<String>,
    capture_left_half: bool,
    scroll_mode: ScrollMode,
    stealth: StealthConfig,
    humanizer: Humanizer,
    enigo: Enigo,
}

impl DesktopController {
    pub fn new(cfg: &ControllerSettings, stealth: StealthConfig) -> Result<Self, ControllerError> {
        let enigo = Enigo::new(&EnigoSettings::default())
            .map_err(|e| ControllerError::Input(e.to_string()))?;
        Ok(Self {
            state: ControllerState::new(Some(cfg.window_title.clone()), cfg.capture_client_only),
            process_hints: cfg.process_hints.clone(),
            capture_left_half: cfg.capture_left_half,
            scroll_mode: cfg.scroll_mode,
            stealth,
            humanizer: Humanizer::new(),
            enigo,
        })
    }

    fn find_window(&self) -> Option<WindowInfo> {
        let title = self.state.window_title.as_deref().unwrap_or_default();
        let found = window::find_window(title, &self.process_hints);
        if found.is_none() {
            log::debug!("[Desktop] no window matches '{}'", title);
        }
        found
    }

    /// Client area of the target window in screen coordinates
    pub fn client_region(&self) -> Option<Region> {
        self.find_window().and_then(|w| w.client_region())
    }

    /// Left half of the client area
    pub fn left_half_region(&self) -> Option<Region> {
        self.client_region().map(|r| r.left_half())
    }

    /// Capture the left half, or the whole client area if the window is gone
    pub fn screenshot_left_half(&mut self) -> Result<RgbImage, ControllerError> {
        let region = self.left_half_region();
        self.screenshot(region)
    }

    fn capture_region(&mut self, region: Region) -> Result<RgbImage, ControllerError> {
        match grab_region(region) {
            Ok((frame, visible)) => {
                self.state.record_capture(visible);
                Ok(frame)
            }
            Err(e) => {
                self.state.record_failed_capture(region);
                Err(e)
            }
        }
    }

    fn capture_full_screen(&mut self) -> Result<RgbImage, ControllerError> {
        let monitors = xcap::Monitor::all().map_err(|e| ControllerError::Capture(e.to_string()))?;
        let monitor = monitors
            .iter()
            .find(|m| m.is_primary())
            .or_else(|| monitors.first())
            .ok_or_else(|| ControllerError::Capture("no monitors".to_string()))?;
        let image = monitor
            .capture_image()
            .map_err(|e| ControllerError::Capture(e.to_string()))?;
        self.state.record_capture(Region::new(
            monitor.x(),
            monitor.y(),
            image.width(),
            image.height(),
        ));
        Ok(DynamicImage::ImageRgba8(image).to_rgb8())
    }

    fn input_err(e: enigo::InputError) -> ControllerError {
        ControllerError::Input(e.to_string())
    }

    /// Move the pointer, along an eased path when organic moves are on
    fn move_to(&mut self, x: i32, y: i32, travel: Duration) -> Result<(), ControllerError> {
        if !self.stealth.organic_moves {
            return self
                .enigo
                .move_mouse(x, y, Coordinate::Abs)
                .map_err(Self::input_err);
        }
        let from = self.enigo.location().map_err(Self::input_err)?;
        let pause = travel / MOVE_STEPS;
        let path = eased_path(from, (x, y), MOVE_STEPS);
        let last = path.len().saturating_sub(1);
        for (i, (px, py)) in path.into_iter().enumerate() {
            // Small overshoot noise on the way, exact on arrival
            let (nx, ny) = if i < last {
                self.humanizer.humanize_position(2)
            } else {
                (0, 0)
            };
            self.enigo
                .move_mouse(px + nx, py + ny, Coordinate::Abs)
                .map_err(Self::input_err)?;
            thread::sleep(pause);
        }
        Ok(())
    }

    fn drag_scroll(
        &mut self,
        target: ScrollTarget,
        opts: &ScrollOptions,
    ) -> Result<bool, ControllerError> {
        let Some(area) = self.client_region().or(self.state.last_bbox) else {
            log::warn!("[Desktop] scroll skipped: no target area");
            return Ok(false);
        };
        let center = match target {
            ScrollTarget::Box(b) => {
                let (cx, cy) = b.center();
                Some(self.to_screen(cx, cy))
            }
            ScrollTarget::Delta(_) => None,
        };
        let opts = ScrollOptions {
            max_pixels_ratio: None,
            ..opts.clone()
        };
        let Some(plan) = plan_drag(area, target, center, &opts) else {
            return Ok(false);
        };

        for _ in 0..opts.steps.max(1) {
            let x = plan.x + self.humanizer.jitter(opts.jitter);
            let y0 = plan.y_start + self.humanizer.jitter(opts.jitter);
            let y1 = plan.y_end + self.humanizer.jitter(opts.jitter);

            let travel = self.humanizer.travel_time();
            self.move_to(x, y0, travel)?;
            self.enigo
                .button(Button::Left, Direction::Press)
                .map_err(Self::input_err)?;
            let drag = self.humanizer.uniform_ms(opts.duration_ms);
            let moved = self.move_to(x, y1, drag);
            // Hold at the end so kinetic scrolling stops where we let go.
            thread::sleep(self.humanizer.uniform_ms(opts.end_hold_ms));
            self.enigo
                .button(Button::Left, Direction::Release)
                .map_err(Self::input_err)?;
            moved?;
            thread::sleep(self.humanizer.uniform_ms(opts.pause_ms));
        }
        Ok(true)
    }

    fn wheel_scroll(
        &mut self,
        target: ScrollTarget,
        opts: &ScrollOptions,
    ) -> Result<bool, ControllerError> {
        let mut notches = match target {
            ScrollTarget::Delta(d) => d,
            ScrollTarget::Box(b) => {
                let n = (b.height().abs() as i32 / PIXELS_PER_NOTCH).max(1);
                if opts.default_down {
                    -n
                } else {
                    n
                }
            }
        };
        if opts.invert {
            notches = -notches;
        }
        for chunk in split_chunks(notches, opts.steps) {
            // enigo scrolls down for positive lengths
            self.enigo
                .scroll(-chunk, Axis::Vertical)
                .map_err(Self::input_err)?;
            thread::sleep(self.humanizer.uniform_ms(opts.duration_ms));
        }
        Ok(true)
    }
}

/// Split `total` into `steps` near-equal signed chunks, none zero while
/// anything remains.
pub fn split_chunks(total: i32, steps: u32) -> Vec<i32> {
    let steps = steps.max(1) as i32;
    let mut remaining = total;
    let mut chunks = Vec::with_capacity(steps as usize);
    for i in 0..steps {
        let divisor = steps - i;
        let mut chunk = remaining / divisor;
        if chunk == 0 && remaining != 0 {
            chunk = remaining.signum();
        }
        chunks.push(chunk);
        remaining -= chunk;
    }
    chunks
}

impl Controller for DesktopController {
    fn name(&self) -> &'static str {
        "desktop"
    }

    fn state(&self) -> &ControllerState {
        &self.state
    }

    fn focus(&mut self) -> bool {
        let Some(w) = self.find_window() else {
            return false;
        };

        if w.is_minimized() {
            if let Err(e) = w.restore() {
                log::debug!("[Desktop] restore failed: {}", e);
            }
            thread::sleep(Duration::from_millis(150));
        }

        if let Err(e) = w.activate() {
            log::debug!("[Desktop] activate failed ({}), trying minimize/restore", e);
            let _ = w.minimize();
            thread::sleep(Duration::from_millis(100));
            let _ = w.restore();
            thread::sleep(Duration::from_millis(200));
        }

        thread::sleep(Duration::from_millis(100));
        true
    }

    fn screenshot(&mut self, region: Option<Region>) -> Result<RgbImage, ControllerError> {
        if let Some(region) = region {
            return self.capture_region(region);
        }
        if self.state.capture_client_only {
            if let Some(client) = self.client_region() {
                return self.capture_region(client);
            }
            log::debug!("[Desktop] client area unavailable, capturing full screen");
        }
        self.capture_full_screen()
    }

    fn click(&mut self, x: i32, y: i32, opts: ClickOptions) -> Result<(), ControllerError> {
        let jitter = opts.jitter.unwrap_or(self.stealth.click_jitter_px);
        let (tx, ty) = self.humanizer.jitter_point(x, y, jitter);

        if self.stealth.organic_delays {
            thread::sleep(self.humanizer.pre_click_delay());
        }
        let travel = self.humanizer.travel_time();
        self.move_to(tx, ty, travel)?;

        for i in 0..opts.clicks.max(1) {
            if i > 0 {
                thread::sleep(self.humanizer.multi_click_gap(opts.interval));
            }
            self.enigo
                .button(Button::Left, Direction::Click)
                .map_err(Self::input_err)?;
        }
        Ok(())
    }

    fn mouse_down(&mut self, x: i32, y: i32) -> Result<(), ControllerError> {
        let travel = self.humanizer.travel_time();
        self.move_to(x, y, travel)?;
        self.enigo
            .button(Button::Left, Direction::Press)
            .map_err(Self::input_err)
    }

    fn mouse_up(&mut self, x: i32, y: i32) -> Result<(), ControllerError> {
        self.enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(Self::input_err)?;
        self.enigo
            .button(Button::Left, Direction::Release)
            .map_err(Self::input_err)
    }

    fn hold(&mut self, x: i32, y: i32, duration: Duration) -> Result<(), ControllerError> {
        self.mouse_down(x, y)?;
        thread::sleep(duration);
        self.mouse_up(x, y)
    }

    fn scroll(
        &mut self,
        target: ScrollTarget,
        opts: &ScrollOptions,
    ) -> Result<bool, ControllerError> {
        match self.scroll_mode {
            ScrollMode::Drag => self.drag_scroll(target, opts),
            ScrollMode::Wheel => self.wheel_scroll(target, opts),
        }
    }

    fn default_capture_region(&mut self) -> Option<Region> {
        if self.capture_left_half {
            self.left_half_region()
        } else {
            None
        }
    }
}

fn monitor_region(monitor: &xcap::Monitor) -> Region {
    Region::new(monitor.x(), monitor.y(), monitor.width(), monitor.height())
}

/// Monitor showing the largest part of `region`, with that visible part.
/// Ties go to the earlier monitor.
pub fn best_overlap(screens: &[Region], region: &Region) -> Option<(usize, Region)> {
    screens
        .iter()
        .enumerate()
        .filter_map(|(i, screen)| screen.intersect(region).map(|v| (i, v)))
        .fold(None, |best: Option<(usize, Region)>, (i, v)| match best {
            Some((_, b)) if area(&b) >= area(&v) => best,
            _ => Some((i, v)),
        })
}

fn area(r: &Region) -> u64 {
    u64::from(r.width) * u64::from(r.height)
}

/// Capture the visible part of `region` from whichever monitor shows most of it
fn grab_region(region: Region) -> Result<(RgbImage, Region), ControllerError> {
    let monitors = xcap::Monitor::all().map_err(|e| ControllerError::Capture(e.to_string()))?;
    let screens: Vec<Region> = monitors.iter().map(monitor_region).collect();
    let (index, visible) = best_overlap(&screens, &region)
        .ok_or_else(|| ControllerError::Capture(format!("{region:?} is off-screen")))?;
    let screen = screens[index];

    let full = monitors[index]
        .capture_image()
        .map_err(|e| ControllerError::Capture(e.to_string()))?;
    let crop = image::imageops::crop_imm(
        &full,
        (visible.left - screen.left) as u32,
        (visible.top - screen.top) as u32,
        visible.width,
        visible.height,
    )
    .to_image();
    Ok((DynamicImage::ImageRgba8(crop).to_rgb8(), visible))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_chunks_even() {
        assert_eq!(split_chunks(9, 3), vec![3, 3, 3]);
        assert_eq!(split_chunks(-10, 3), vec![-3, -3, -4]);
    }

    #[test]
    fn test_split_chunks_small_total() {
        let chunks = split_chunks(2, 4);
        assert_eq!(chunks.iter().sum::<i32>(), 2);
        assert_eq!(chunks, vec![1, 1, 0, 0]);
    }

    #[test]
    fn test_best_overlap_prefers_monitor_showing_most() {
        let screens = [Region::new(0, 0, 1920, 1080), Region::new(1920, 0, 1920, 1080)];

        // top-left corner hangs off the top of the screen
        let window = Region::new(100, -40, 800, 600);
        assert_eq!(best_overlap(&screens, &window), Some((0, Region::new(100, 0, 800, 560))));

        // straddles both, mostly on the second
        let window = Region::new(1820, 100, 800, 600);
        assert_eq!(
            best_overlap(&screens, &window),
            Some((1, Region::new(1920, 100, 700, 600)))
        );

        assert_eq!(best_overlap(&screens, &Region::new(-900, -900, 100, 100)), None);
    }

    #[test]
    fn test_split_chunks_single_step() {
        assert_eq!(split_chunks(-7, 0), vec![-7]);
    }
}
