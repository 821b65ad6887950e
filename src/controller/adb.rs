//! Android controller over the ADB bridge
//!
//! There is no window here: the whole device screen is the target. Frames
//! are pulled with `exec-out screencap -p`, input is issued as `input tap`
//! and `input swipe` shell commands clamped to the device bounds.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use image::{ImageFormat, RgbImage};
use once_cell::sync::Lazy;
use regex::Regex;

use super::command::{args, describe, CommandOutput, CommandRunner, SystemRunner};
use super::{
    plan_drag, ClickOptions, Controller, ControllerError, ControllerState, ScrollOptions,
    ScrollTarget,
};
use crate::config::ControllerSettings;
use crate::geometry::Region;
use crate::stealth::{Humanizer, StealthConfig};

/// Screen size assumed when the device will not tell
pub const DEFAULT_SCREEN: (u32, u32) = (1920, 1080);

const LIST_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Find the adb executable: `ADB_EXEC`, the configured path, `PATH`, then
/// the usual SDK install locations.
pub fn resolve_adb_executable(configured: Option<&str>) -> Result<String, ControllerError> {
    if let Ok(env_path) = std::env::var("ADB_EXEC") {
        if which::which(&env_path).is_ok() {
            return Ok(env_path);
        }
        log::warn!("[ADB] ADB_EXEC={} is not executable, ignoring", env_path);
    }
    if let Some(path) = configured.filter(|p| !p.is_empty()) {
        if which::which(path).is_ok() {
            return Ok(path.to_string());
        }
    }
    if let Ok(path) = which::which("adb") {
        return Ok(path.to_string_lossy().into_owned());
    }
    if cfg!(windows) {
        let candidates = [
            ("LOCALAPPDATA", r"Android\sdk\platform-tools\adb.exe"),
            ("USERPROFILE", r"AppData\Local\Android\sdk\platform-tools\adb.exe"),
            ("PROGRAMFILES", r"Android\platform-tools\adb.exe"),
        ];
        for (var, tail) in candidates {
            if let Ok(base) = std::env::var(var) {
                let path = Path::new(&base).join(tail);
                if path.is_file() {
                    return Ok(path.to_string_lossy().into_owned());
                }
            }
        }
    }
    Err(ControllerError::BridgeNotFound)
}

/// Serials in state `device` from `adb devices` output
pub fn parse_device_list(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            (parts.next() == Some("device")).then(|| serial.to_string())
        })
        .collect()
}

/// `Physical size: 1080x2400` style output of `wm size`. An override size,
/// when present, comes last and wins.
pub fn parse_wm_size(output: &str) -> Option<(u32, u32)> {
    output
        .lines()
        .filter(|l| l.to_lowercase().contains("size:"))
        .filter_map(|l| {
            let payload = l.rsplit(':').next()?.trim();
            let (w, h) = payload.split_once('x')?;
            Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
        })
        .last()
}

static DUMPSYS_INIT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"init=(\d+)x(\d+)").ok());

/// `init=WxH` from `dumpsys display`
pub fn parse_dumpsys_display(output: &str) -> Option<(u32, u32)> {
    let caps = DUMPSYS_INIT.as_ref()?.captures(output)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// Whether `device` appears in a device list, allowing a host prefix match
/// for `host:port` serials.
pub fn device_listed(device: &str, devices: &[String]) -> bool {
    if devices.is_empty() {
        return false;
    }
    if device.is_empty() {
        return true;
    }
    let prefix = device.split(':').next().unwrap_or(device);
    devices
        .iter()
        .any(|d| d == device || d.starts_with(prefix))
}

/// Command channel to one device
#[derive(Clone)]
pub struct AdbBridge {
    runner: Arc<dyn CommandRunner>,
    executable: String,
    device: String,
    timeout: Duration,
    retries: u32,
    retry_delay: Duration,
}

impl AdbBridge {
    pub fn new(runner: Arc<dyn CommandRunner>, executable: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            runner,
            executable: executable.into(),
            device: device.into().trim().to_string(),
            timeout: Duration::from_secs(10),
            retries: 2,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Set command timeout, retry count and delay between retries
    pub fn with_retry_policy(mut self, timeout: Duration, retries: u32, retry_delay: Duration) -> Self {
        self.timeout = timeout;
        self.retries = retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn from_settings(cfg: &ControllerSettings) -> Result<Self, ControllerError> {
        let executable = resolve_adb_executable(cfg.adb_executable.as_deref())?;
        Ok(Self::new(Arc::new(SystemRunner), executable, cfg.adb_device.clone()).with_retry_policy(
            Duration::from_millis(cfg.command_timeout_ms),
            cfg.command_retries,
            Duration::from_millis(cfg.retry_delay_ms),
        ))
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Argument list with the device selector prepended
    pub fn device_args(&self, rest: &[&str]) -> Vec<String> {
        let mut full = Vec::with_capacity(rest.len() + 2);
        if !self.device.is_empty() {
            full.push("-s".to_string());
            full.push(self.device.clone());
        }
        full.extend(rest.iter().map(|s| s.to_string()));
        full
    }

    /// Run a device command with the default timeout
    pub fn command(&self, rest: &[&str]) -> Result<CommandOutput, ControllerError> {
        self.command_with_timeout(rest, self.timeout)
    }

    /// Run a device command. Timeouts are retried after a reconnect; a
    /// non-zero exit is a hard failure.
    pub fn command_with_timeout(
        &self,
        rest: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, ControllerError> {
        let full = self.device_args(rest);
        let attempts = self.retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.runner.run(&self.executable, &full, timeout) {
                Ok(out) if out.success() => return Ok(out),
                Ok(out) => {
                    return Err(ControllerError::CommandFailed {
                        command: describe(&self.executable, &full),
                        code: out.code,
                        stderr: out.stderr_text(),
                    })
                }
                Err(ControllerError::CommandTimeout(cmd, t)) if attempt < attempts => {
                    log::warn!(
                        "[ADB] `{}` timed out after {:?} (attempt {}/{}), reconnecting",
                        cmd,
                        t,
                        attempt,
                        attempts
                    );
                    if !self.device.is_empty() {
                        self.auto_connect();
                    }
                    thread::sleep(self.retry_delay.max(Duration::from_millis(100)));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Serials currently in state `device`
    pub fn list_devices(&self) -> Vec<String> {
        match self.runner.run(&self.executable, &args(&["devices"]), LIST_TIMEOUT) {
            Ok(out) if out.success() => parse_device_list(&out.stdout_text()),
            Ok(_) => Vec::new(),
            Err(e) => {
                log::debug!("[ADB] listing devices failed: {}", e);
                Vec::new()
            }
        }
    }

    /// `adb connect` for network serials not already attached
    pub fn auto_connect(&self) {
        if let Ok(out) = self.runner.run(&self.executable, &args(&["devices"]), LIST_TIMEOUT) {
            if out.success() && out.stdout_text().contains(&self.device) {
                return;
            }
        }
        if !self.device.contains(':') {
            return;
        }
        log::info!("[ADB] connecting to {}", self.device);
        match self.runner.run(
            &self.executable,
            &args(&["connect", &self.device]),
            CONNECT_TIMEOUT,
        ) {
            Ok(_) => thread::sleep(Duration::from_millis(500)),
            Err(e) => log::warn!("[ADB] connect {} failed: {}", self.device, e),
        }
    }

    /// Screen size from `wm size`, then `dumpsys display`
    pub fn detect_screen_size(&self) -> Option<(u32, u32)> {
        if let Ok(out) = self.command(&["shell", "wm", "size"]) {
            if let Some(size) = parse_wm_size(&out.stdout_text()) {
                return Some(size);
            }
        }
        if let Ok(out) = self.command(&["shell", "dumpsys", "display"]) {
            if let Some(size) = parse_dumpsys_display(&out.stdout_text()) {
                return Some(size);
            }
        }
        None
    }

    /// Full-resolution frame from the device
    pub fn screencap(&self) -> Result<RgbImage, ControllerError> {
        let out = self.command(&["exec-out", "screencap", "-p"])?;
        let img = image::load_from_memory_with_format(&out.stdout, ImageFormat::Png)?;
        Ok(img.to_rgb8())
    }

    pub fn tap(&self, x: i32, y: i32) -> Result<(), ControllerError> {
        self.command(&["shell", "input", "tap", &x.to_string(), &y.to_string()])
            .map(|_| ())
    }

    pub fn swipe(
        &self,
        from: (i32, i32),
        to: (i32, i32),
        duration: Duration,
        timeout: Duration,
    ) -> Result<(), ControllerError> {
        let ms = (duration.as_millis() as u64).max(1).to_string();
        self.command_with_timeout(
            &[
                "shell",
                "input",
                "swipe",
                &from.0.to_string(),
                &from.1.to_string(),
                &to.0.to_string(),
                &to.1.to_string(),
                &ms,
            ],
            timeout,
        )
        .map(|_| ())
    }
}

/// Controller for an Android device reached over ADB
pub struct AdbController {
    bridge: AdbBridge,
    state: ControllerState,
    screen: (u32, u32),
    stealth: StealthConfig,
    humanizer: Humanizer,
}

impl AdbController {
    /// Resolve adb, attach to the configured device and size its screen
    pub fn connect(cfg: &ControllerSettings, stealth: StealthConfig) -> Result<Self, ControllerError> {
        let bridge = AdbBridge::from_settings(cfg)?;
        Ok(Self::with_bridge(bridge, stealth))
    }

    /// Attach through an existing bridge. With no device configured the
    /// first attached device is used; a configured device that never shows
    /// up is replaced by the first attached one.
    pub fn with_bridge(mut bridge: AdbBridge, stealth: StealthConfig) -> Self {
        if bridge.device.is_empty() {
            if let Some(first) = bridge.list_devices().into_iter().next() {
                log::info!("[ADB] auto-selected device {}", first);
                bridge.device = first;
            }
        } else {
            bridge.auto_connect();
            let devices = bridge.list_devices();
            if !devices.contains(&bridge.device) {
                if let Some(first) = devices.into_iter().next() {
                    log::warn!("[ADB] {} not attached, falling back to {}", bridge.device, first);
                    bridge.device = first;
                }
            }
        }

        let screen = bridge.detect_screen_size().unwrap_or_else(|| {
            log::warn!("[ADB] could not detect screen size, assuming {:?}", DEFAULT_SCREEN);
            DEFAULT_SCREEN
        });
        log::info!("[ADB] device {} screen {}x{}", bridge.device, screen.0, screen.1);

        Self {
            bridge,
            state: ControllerState::new(None, false),
            screen,
            stealth,
            humanizer: Humanizer::new(),
        }
    }

    pub fn bridge(&self) -> &AdbBridge {
        &self.bridge
    }

    pub fn screen_size(&self) -> (u32, u32) {
        self.screen
    }

    fn clamp(&self, x: i32, y: i32) -> (i32, i32) {
        let (w, h) = self.screen;
        (
            x.clamp(0, (w as i32 - 1).max(0)),
            y.clamp(0, (h as i32 - 1).max(0)),
        )
    }

    fn jittered(&mut self, x: i32, y: i32, jitter: i32) -> (i32, i32) {
        let (jx, jy) = self.humanizer.jitter_point(x, y, jitter);
        self.clamp(jx, jy)
    }

    /// Crop a full device frame to `region` and record where it came from
    pub fn finish_capture(
        &mut self,
        frame: RgbImage,
        region: Option<Region>,
    ) -> Result<RgbImage, ControllerError> {
        self.screen = frame.dimensions();
        let full = Region::new(0, 0, frame.width(), frame.height());
        let Some(region) = region else {
            self.state.record_capture(full);
            return Ok(frame);
        };
        let Some(visible) = full.intersect(&region) else {
            self.state.record_failed_capture(region);
            return Err(ControllerError::Capture(format!("{region:?} is outside the screen")));
        };
        let crop = image::imageops::crop_imm(
            &frame,
            visible.left as u32,
            visible.top as u32,
            visible.width,
            visible.height,
        )
        .to_image();
        self.state.record_capture(visible);
        Ok(crop)
    }
}

impl Controller for AdbController {
    fn name(&self) -> &'static str {
        "adb"
    }

    fn state(&self) -> &ControllerState {
        &self.state
    }

    fn focus(&mut self) -> bool {
        let devices = self.bridge.list_devices();
        device_listed(&self.bridge.device, &devices)
    }

    fn screenshot(&mut self, region: Option<Region>) -> Result<RgbImage, ControllerError> {
        match self.bridge.screencap() {
            Ok(frame) => self.finish_capture(frame, region),
            Err(e) => {
                let (w, h) = self.screen;
                self.state
                    .record_failed_capture(region.unwrap_or(Region::new(0, 0, w, h)));
                Err(e)
            }
        }
    }

    fn click(&mut self, x: i32, y: i32, opts: ClickOptions) -> Result<(), ControllerError> {
        let jitter = opts.jitter.unwrap_or(self.stealth.click_jitter_px);
        let (tx, ty) = self.jittered(x, y, jitter);

        if self.stealth.organic_delays {
            thread::sleep(self.humanizer.pre_click_delay());
        }
        let clicks = opts.clicks.max(1);
        for _ in 0..clicks {
            self.bridge.tap(tx, ty)?;
            if clicks > 1 {
                thread::sleep(self.humanizer.multi_click_gap(opts.interval));
            }
        }
        Ok(())
    }

    fn mouse_down(&mut self, x: i32, y: i32) -> Result<(), ControllerError> {
        self.click(x, y, ClickOptions::default())
    }

    fn mouse_up(&mut self, _x: i32, _y: i32) -> Result<(), ControllerError> {
        // Taps are atomic on the device; there is nothing to release.
        Ok(())
    }

    fn hold(&mut self, x: i32, y: i32, duration: Duration) -> Result<(), ControllerError> {
        let (tx, ty) = self.jittered(x, y, self.stealth.click_jitter_px);
        let duration = duration.max(Duration::from_millis(50));
        self.bridge
            .swipe((tx, ty), (tx, ty), duration, self.bridge.timeout + duration)
    }

    fn scroll(
        &mut self,
        target: ScrollTarget,
        opts: &ScrollOptions,
    ) -> Result<bool, ControllerError> {
        let (w, h) = self.screen;
        let area = Region::new(0, 0, w, h);
        let center = match target {
            ScrollTarget::Box(b) => {
                let (cx, cy) = b.center();
                Some(self.to_screen(cx, cy))
            }
            ScrollTarget::Delta(_) => None,
        };
        let Some(plan) = plan_drag(area, target, center, opts) else {
            return Ok(false);
        };

        for _ in 0..opts.steps.max(1) {
            let x = plan.x + self.humanizer.jitter(opts.jitter);
            let y_start = plan.y_start + self.humanizer.jitter(opts.jitter);
            let start = self.clamp(x, y_start);
            let y_end = plan.y_end + self.humanizer.jitter(opts.jitter);
            let end = self.clamp(x, y_end);

            let drag = self.humanizer.uniform_ms(opts.duration_ms);
            self.bridge.swipe(start, end, drag, self.bridge.timeout)?;
            thread::sleep(self.humanizer.uniform_ms(opts.end_hold_ms) * 2);

            // A stationary swipe at the end point stops the fling.
            let hold = self.humanizer.uniform_ms(opts.end_hold_ms);
            if !hold.is_zero() {
                self.bridge
                    .swipe(end, end, hold, hold + Duration::from_secs(5))?;
            }
            thread::sleep(self.humanizer.uniform_ms(opts.pause_ms));
        }
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex;

    type Handler =
        Box<dyn Fn(&[String]) -> Result<CommandOutput, ControllerError> + Send + Sync>;

    /// Runner answering from a closure and recording each command line
    pub(crate) struct FakeRunner {
        pub calls: Mutex<Vec<String>>,
        handler: Handler,
    }

    impl FakeRunner {
        pub(crate) fn new(
            handler: impl Fn(&[String]) -> Result<CommandOutput, ControllerError> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                handler: Box::new(handler),
            })
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(
            &self,
            _program: &str,
            args: &[String],
            _timeout: Duration,
        ) -> Result<CommandOutput, ControllerError> {
            self.calls.lock().unwrap().push(args.join(" "));
            (self.handler)(args)
        }
    }

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| image::Rgb([x as u8, y as u8, 7]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    /// A well-behaved device `emu` with a 1080x2400 screen
    pub(crate) fn device_handler(args: &[String]) -> Result<CommandOutput, ControllerError> {
        let line = args.join(" ");
        if line == "devices" {
            return Ok(CommandOutput::ok("List of devices attached\nemu\tdevice\n"));
        }
        if line.ends_with("wm size") {
            return Ok(CommandOutput::ok("Physical size: 1080x2400\n"));
        }
        if line.ends_with("screencap -p") {
            return Ok(CommandOutput::ok(png_bytes(40, 30)));
        }
        Ok(CommandOutput::ok(""))
    }

    pub(crate) fn controller(runner: Arc<FakeRunner>) -> AdbController {
        let bridge = AdbBridge::new(runner, "adb", "emu").with_retry_policy(
            Duration::from_secs(1),
            2,
            Duration::ZERO,
        );
        AdbController::with_bridge(bridge, StealthConfig::disabled())
    }

    #[test]
    fn test_parse_device_list() {
        let out = "List of devices attached\n127.0.0.1:5555\tdevice\nR58M\toffline\nemulator-5554\tdevice product:x\n\n";
        assert_eq!(parse_device_list(out), vec!["127.0.0.1:5555", "emulator-5554"]);
    }

    #[test]
    fn test_parse_wm_size() {
        assert_eq!(parse_wm_size("Physical size: 1080x2400\n"), Some((1080, 2400)));
        assert_eq!(
            parse_wm_size("Physical size: 1080x2400\nOverride size: 720x1600\n"),
            Some((720, 1600))
        );
        assert_eq!(parse_wm_size("error: no devices"), None);
    }

    #[test]
    fn test_parse_dumpsys_display() {
        let out = "mDisplayInfos=... real 1080 x 2400, init=1080x2400 440dpi ...";
        assert_eq!(parse_dumpsys_display(out), Some((1080, 2400)));
        assert_eq!(parse_dumpsys_display("nothing"), None);
    }

    #[test]
    fn test_device_listed_prefix() {
        let devices = vec!["127.0.0.1:5037".to_string()];
        assert!(device_listed("127.0.0.1:5555", &devices));
        assert!(device_listed("", &devices));
        assert!(!device_listed("R58M", &devices));
        assert!(!device_listed("R58M", &[]));
    }

    #[test]
    fn test_command_retries_timeouts_then_fails() {
        let runner = FakeRunner::new(|args| {
            if args.first().map(String::as_str) == Some("devices") {
                return Ok(CommandOutput::ok("List of devices attached\n"));
            }
            Err(ControllerError::CommandTimeout(args.join(" "), Duration::from_secs(1)))
        });
        let bridge = AdbBridge::new(runner.clone(), "adb", "host:5555").with_retry_policy(
            Duration::from_secs(1),
            2,
            Duration::ZERO,
        );

        let err = bridge.command(&["shell", "input", "tap", "1", "2"]).unwrap_err();
        assert!(matches!(err, ControllerError::CommandTimeout(_, _)));

        let calls = runner.calls();
        let taps = calls.iter().filter(|c| c.contains("input tap")).count();
        let connects = calls.iter().filter(|c| c.starts_with("connect")).count();
        assert_eq!(taps, 3);
        assert_eq!(connects, 2);
    }

    #[test]
    fn test_command_nonzero_exit_is_hard_failure() {
        let runner = FakeRunner::new(|_| {
            Ok(CommandOutput {
                code: Some(1),
                stdout: Vec::new(),
                stderr: b"error: device offline".to_vec(),
            })
        });
        let bridge = AdbBridge::new(runner.clone(), "adb", "emu");
        match bridge.command(&["shell", "wm", "size"]) {
            Err(ControllerError::CommandFailed { stderr, code, .. }) => {
                assert_eq!(code, Some(1));
                assert_eq!(stderr, "error: device offline");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_screen_size_detection_and_default() {
        let runner = FakeRunner::new(device_handler);
        assert_eq!(controller(runner).screen_size(), (1080, 2400));

        let silent = FakeRunner::new(|_| Ok(CommandOutput::ok("")));
        assert_eq!(controller(silent).screen_size(), DEFAULT_SCREEN);
    }

    #[test]
    fn test_screenshot_records_origin_idempotently() {
        let runner = FakeRunner::new(device_handler);
        let mut ctrl = controller(runner);

        let full = ctrl.screenshot(None).unwrap();
        assert_eq!(full.dimensions(), (40, 30));
        assert_eq!(ctrl.state().last_origin, (0, 0));
        assert_eq!(ctrl.screen_size(), (40, 30));

        let region = Some(Region::new(10, 5, 20, 10));
        let first = ctrl.screenshot(region).unwrap();
        let state_a = ctrl.state().clone();
        let second = ctrl.screenshot(region).unwrap();
        assert_eq!(first.dimensions(), (20, 10));
        assert_eq!(first, second);
        assert_eq!(ctrl.state(), &state_a);
        assert_eq!(state_a.last_origin, (10, 5));
        assert_eq!(state_a.last_bbox, Some(Region::new(10, 5, 20, 10)));
        // pixel (0,0) of the crop is device pixel (10,5)
        assert_eq!(first.get_pixel(0, 0).0, [10, 5, 7]);
    }

    #[test]
    fn test_offscreen_capture_replaces_previous_origin() {
        let runner = FakeRunner::new(device_handler);
        let mut ctrl = controller(runner);

        ctrl.screenshot(Some(Region::new(10, 10, 20, 20))).unwrap();
        assert_eq!(ctrl.state().last_origin, (10, 10));

        let err = ctrl.screenshot(Some(Region::new(500, 500, 20, 20))).unwrap_err();
        assert!(matches!(err, ControllerError::Capture(_)));
        assert_eq!(ctrl.state().last_origin, (500, 500));
        assert_eq!(ctrl.state().last_bbox, None);
    }

    #[test]
    fn test_click_clamps_to_screen() {
        let runner = FakeRunner::new(device_handler);
        let mut ctrl = controller(runner.clone());

        ctrl.click(5000, -20, ClickOptions::times(2).with_jitter(0)).unwrap();
        let taps: Vec<_> = runner
            .calls()
            .into_iter()
            .filter(|c| c.contains("input tap"))
            .collect();
        assert_eq!(taps, vec!["-s emu shell input tap 1079 0"; 2]);
    }

    #[test]
    fn test_click_bbox_translates_origin() {
        let runner = FakeRunner::new(device_handler);
        let mut ctrl = controller(runner.clone());
        ctrl.screenshot(Some(Region::new(10, 5, 20, 10))).unwrap();

        ctrl.click_bbox(&crate::geometry::BBox::new(2.0, 2.0, 6.0, 4.0), 1)
            .unwrap();
        assert!(runner.calls().iter().any(|c| c == "-s emu shell input tap 14 8"));
    }

    #[test]
    fn test_hold_is_stationary_swipe() {
        let runner = FakeRunner::new(device_handler);
        let mut ctrl = controller(runner.clone());
        ctrl.hold(100, 200, Duration::from_millis(10)).unwrap();
        assert!(runner
            .calls()
            .iter()
            .any(|c| c == "-s emu shell input swipe 100 200 100 200 50"));
    }

    #[test]
    fn test_scroll_swipes_then_holds() {
        let runner = FakeRunner::new(device_handler);
        let mut ctrl = controller(runner.clone());
        let opts = ScrollOptions {
            end_hold_ms: (60, 60),
            duration_ms: (200, 200),
            ..ScrollOptions::from_stealth(&StealthConfig::disabled())
        };

        assert!(ctrl.scroll(ScrollTarget::Delta(-300), &opts).unwrap());
        let swipes: Vec<_> = runner
            .calls()
            .into_iter()
            .filter(|c| c.contains("input swipe"))
            .collect();
        assert_eq!(
            swipes,
            vec![
                "-s emu shell input swipe 540 1350 540 1050 200",
                "-s emu shell input swipe 540 1050 540 1050 60",
            ]
        );
    }

    #[test]
    fn test_focus_requires_listed_device() {
        let runner = FakeRunner::new(device_handler);
        assert!(controller(runner).focus());

        let none = FakeRunner::new(|args| {
            if args.join(" ") == "devices" {
                Ok(CommandOutput::ok("List of devices attached\n"))
            } else {
                Ok(CommandOutput::ok(""))
            }
        });
        assert!(!controller(none).focus());
    }

    #[test]
    fn test_missing_device_falls_back_to_first_listed() {
        let runner = FakeRunner::new(|args| {
            if args.join(" ") == "devices" {
                Ok(CommandOutput::ok("List of devices attached\nother\tdevice\n"))
            } else {
                Ok(CommandOutput::ok(""))
            }
        });
        let bridge = AdbBridge::new(runner, "adb", "gone");
        let ctrl = AdbController::with_bridge(bridge, StealthConfig::disabled());
        assert_eq!(ctrl.bridge().device(), "other");
    }
}
