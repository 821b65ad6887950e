//! ADB controller with a persistent mirroring stream
//!
//! The stream is the device's H.264 screen recording decoded by an `ffmpeg`
//! pipe, or a `screencap` loop when ffmpeg is unavailable. A reader thread
//! keeps the newest decoded frame in a shared slot, and a watchdog thread
//! restarts the stream when it ends or freezes. Capture reads the slot
//! without blocking and falls back to a one-shot `screencap` when no fresh
//! frame is available. Input goes through the plain ADB path.

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use image::{ImageFormat, RgbImage};

use super::adb::{AdbBridge, AdbController};
use super::{ClickOptions, Controller, ControllerError, ControllerState, ScrollOptions, ScrollTarget};
use crate::config::ControllerSettings;
use crate::geometry::Region;
use crate::stealth::StealthConfig;

/// PNG trailer: the IEND chunk type plus its fixed CRC
const PNG_IEND: &[u8] = &[b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82];

/// Longest recording `screenrecord` allows, in seconds
const SCREENRECORD_LIMIT: &str = "180";

/// A stream counts as frozen after this many frame intervals of silence
const FROZEN_INTERVALS: u32 = 3;

/// A live sequence of frames
pub trait FrameStream: Send + Sync {
    /// Block until the next frame. `Ok(None)` means the stream ended.
    fn next_frame(&self) -> Result<Option<RgbImage>, ControllerError>;

    /// Tear the stream down; a blocked `next_frame` must return soon after.
    fn close(&self);

    /// Frames arrive only when the screen changes, so silence after the
    /// first frame does not mean the stream is stuck.
    fn changes_only(&self) -> bool {
        false
    }
}

/// Opens frame streams; called again on every restart
pub trait FrameSource: Send + Sync {
    fn open(&self) -> Result<Arc<dyn FrameStream>, ControllerError>;
}

/// Stream timing knobs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamTiming {
    /// Buffered frames older than this are not handed out
    pub stale_after: Duration,
    /// Time a new stream gets to deliver its first frame
    pub start_timeout: Duration,
    pub watchdog_interval: Duration,
}

impl StreamTiming {
    pub fn from_settings(cfg: &ControllerSettings) -> Self {
        Self {
            stale_after: Duration::from_millis(cfg.stale_frame_ms),
            start_timeout: Duration::from_millis(cfg.stream_start_timeout_ms),
            watchdog_interval: Duration::from_millis(cfg.watchdog_interval_ms),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Latest frame plus the instant it arrived
#[derive(Default)]
pub struct FrameSlot {
    inner: Mutex<Option<(Arc<RgbImage>, Instant)>>,
}

impl FrameSlot {
    pub fn store(&self, frame: RgbImage) {
        *lock(&self.inner) = Some((Arc::new(frame), Instant::now()));
    }

    /// Newest frame, if any, without holding the lock afterwards
    pub fn latest(&self) -> Option<(Arc<RgbImage>, Instant)> {
        lock(&self.inner).clone()
    }

    pub fn last_frame_at(&self) -> Option<Instant> {
        lock(&self.inner).as_ref().map(|(_, t)| *t)
    }
}

struct StreamClient {
    stream: Arc<dyn FrameStream>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl StreamClient {
    fn shutdown(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.stream.close();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

struct Shared {
    slot: FrameSlot,
    active: AtomicBool,
    running: AtomicBool,
    restarts: AtomicU32,
    /// When the current stream was (re)started
    started_at: Mutex<Instant>,
    /// Smoothed gap between frames of the current stream
    interval: Mutex<Option<Duration>>,
    changes_only: AtomicBool,
    client: Mutex<Option<StreamClient>>,
    source: Arc<dyn FrameSource>,
    timing: StreamTiming,
}

impl Shared {
    /// Tear down any running client and start a new one. Holds the client
    /// lock for the whole swap so two restarts never interleave.
    fn init_stream(self: &Arc<Self>) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        let mut client = lock(&self.client);
        if let Some(old) = client.take() {
            old.shutdown();
        }

        match self.source.open() {
            Ok(stream) => {
                *lock(&self.started_at) = Instant::now();
                *lock(&self.interval) = None;
                self.changes_only.store(stream.changes_only(), Ordering::SeqCst);
                self.active.store(true, Ordering::SeqCst);
                let stop = Arc::new(AtomicBool::new(false));
                let reader = {
                    let shared = Arc::clone(self);
                    let stream = Arc::clone(&stream);
                    let stop = Arc::clone(&stop);
                    thread::spawn(move || shared.read_frames(stream, stop))
                };
                *client = Some(StreamClient {
                    stream,
                    stop,
                    reader: Some(reader),
                });
                log::info!("[Mirror] stream started");
            }
            Err(e) => {
                log::warn!("[Mirror] stream start failed: {}", e);
                self.active.store(false, Ordering::SeqCst);
            }
        }
    }

    fn read_frames(&self, stream: Arc<dyn FrameStream>, stop: Arc<AtomicBool>) {
        while !stop.load(Ordering::SeqCst) && self.running.load(Ordering::SeqCst) {
            match stream.next_frame() {
                Ok(Some(frame)) => {
                    self.note_frame_gap();
                    self.slot.store(frame);
                }
                Ok(None) => {
                    log::debug!("[Mirror] stream ended");
                    break;
                }
                Err(e) => {
                    log::debug!("[Mirror] stream error: {}", e);
                    break;
                }
            }
        }
        if !stop.load(Ordering::SeqCst) {
            self.active.store(false, Ordering::SeqCst);
        }
    }

    /// Fold the gap since the previous frame (or the stream start) into the
    /// smoothed frame interval
    fn note_frame_gap(&self) {
        let gap = self.silence();
        let mut interval = lock(&self.interval);
        *interval = Some(match *interval {
            Some(prev) => (prev * 3 + gap) / 4,
            None => gap,
        });
    }

    /// Time since the stream last showed signs of life
    fn silence(&self) -> Duration {
        let started = *lock(&self.started_at);
        let last = self
            .slot
            .last_frame_at()
            .map_or(started, |t| t.max(started));
        last.elapsed()
    }

    /// Silence of a frozen stream, or `None` while it keeps its own cadence
    fn frozen_for(&self) -> Option<Duration> {
        let silence = self.silence();
        let limit = match *lock(&self.interval) {
            None => self.timing.start_timeout.max(self.timing.stale_after),
            Some(_) if self.changes_only.load(Ordering::SeqCst) => return None,
            Some(interval) => self.timing.stale_after.max(interval * FROZEN_INTERVALS),
        };
        (silence > limit).then_some(silence)
    }

    fn fresh_frame(&self) -> Option<Arc<RgbImage>> {
        if !self.active.load(Ordering::SeqCst) {
            return None;
        }
        let (frame, at) = self.slot.latest()?;
        (at.elapsed() <= self.timing.stale_after).then_some(frame)
    }

    fn watchdog(self: Arc<Self>) {
        log::debug!("[Watchdog] monitoring mirror stream");
        while self.running.load(Ordering::SeqCst) {
            sleep_while_running(&self.running, self.timing.watchdog_interval);
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            if self.active.load(Ordering::SeqCst) {
                let Some(silence) = self.frozen_for() else {
                    continue;
                };
                log::warn!(
                    "[Watchdog] stream frozen (last frame {:.1}s ago), restarting",
                    silence.as_secs_f32()
                );
            } else {
                log::warn!("[Watchdog] stream down, restarting");
            }
            self.active.store(false, Ordering::SeqCst);
            self.init_stream();
            self.restarts.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn sleep_while_running(running: &AtomicBool, total: Duration) {
    let step = Duration::from_millis(20);
    let deadline = Instant::now() + total;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(step.min(deadline - now));
    }
}

/// ADB controller whose captures come from a mirroring stream
pub struct MirrorController {
    inner: AdbController,
    shared: Arc<Shared>,
    watchdog: Option<JoinHandle<()>>,
}

impl MirrorController {
    /// Connect over ADB and start mirroring: decoded screen recording when
    /// ffmpeg is on PATH, a `screencap` loop otherwise
    pub fn start(cfg: &ControllerSettings, stealth: StealthConfig) -> Result<Self, ControllerError> {
        let inner = AdbController::connect(cfg, stealth)?;
        let bridge = inner.bridge().clone();
        let source: Arc<dyn FrameSource> = match cfg.mirror_video.then(|| which::which("ffmpeg")) {
            Some(Ok(ffmpeg)) => {
                log::info!("[Mirror] decoding screen recording with {}", ffmpeg.display());
                Arc::new(VideoSource { bridge, ffmpeg })
            }
            Some(Err(_)) => {
                log::warn!("[Mirror] ffmpeg not found in PATH, mirroring with a screencap loop");
                Arc::new(ScreencapSource { bridge })
            }
            None => Arc::new(ScreencapSource { bridge }),
        };
        Ok(Self::with_source(inner, source, StreamTiming::from_settings(cfg)))
    }

    pub fn with_source(inner: AdbController, source: Arc<dyn FrameSource>, timing: StreamTiming) -> Self {
        let shared = Arc::new(Shared {
            slot: FrameSlot::default(),
            active: AtomicBool::new(false),
            running: AtomicBool::new(true),
            restarts: AtomicU32::new(0),
            started_at: Mutex::new(Instant::now()),
            interval: Mutex::new(None),
            changes_only: AtomicBool::new(false),
            client: Mutex::new(None),
            source,
            timing,
        });
        shared.init_stream();

        let watchdog = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || shared.watchdog())
        };

        Self {
            inner,
            shared,
            watchdog: Some(watchdog),
        }
    }

    /// Number of times the watchdog restarted the stream
    pub fn restart_count(&self) -> u32 {
        self.shared.restarts.load(Ordering::SeqCst)
    }

    pub fn stream_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Stop the watchdog and the stream. Idempotent.
    pub fn stop(&mut self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        log::info!("[Mirror] shutting down stream");
        if let Some(watchdog) = self.watchdog.take() {
            let _ = watchdog.join();
        }
        if let Some(client) = lock(&self.shared.client).take() {
            client.shutdown();
        }
        self.shared.active.store(false, Ordering::SeqCst);
    }
}

impl Drop for MirrorController {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Controller for MirrorController {
    fn name(&self) -> &'static str {
        "mirror"
    }

    fn state(&self) -> &ControllerState {
        self.inner.state()
    }

    fn focus(&mut self) -> bool {
        self.inner.focus()
    }

    fn screenshot(&mut self, region: Option<Region>) -> Result<RgbImage, ControllerError> {
        match self.shared.fresh_frame() {
            Some(frame) => self.inner.finish_capture(RgbImage::clone(&frame), region),
            None => self.inner.screenshot(region),
        }
    }

    fn click(&mut self, x: i32, y: i32, opts: ClickOptions) -> Result<(), ControllerError> {
        self.inner.click(x, y, opts)
    }

    fn mouse_down(&mut self, x: i32, y: i32) -> Result<(), ControllerError> {
        self.inner.mouse_down(x, y)
    }

    fn mouse_up(&mut self, x: i32, y: i32) -> Result<(), ControllerError> {
        self.inner.mouse_up(x, y)
    }

    fn hold(&mut self, x: i32, y: i32, duration: Duration) -> Result<(), ControllerError> {
        self.inner.hold(x, y, duration)
    }

    fn scroll(
        &mut self,
        target: ScrollTarget,
        opts: &ScrollOptions,
    ) -> Result<bool, ControllerError> {
        self.inner.scroll(target, opts)
    }
}

/// Take one complete PNG off the front of `buf`, if present
pub fn split_png(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let end = buf
        .windows(PNG_IEND.len())
        .position(|w| w == PNG_IEND)?
        + PNG_IEND.len();
    let rest = buf.split_off(end);
    Some(std::mem::replace(buf, rest))
}

/// Continuous `screencap -p` loop on the device
struct ScreencapSource {
    bridge: AdbBridge,
}

impl FrameSource for ScreencapSource {
    fn open(&self) -> Result<Arc<dyn FrameStream>, ControllerError> {
        let argv = self.bridge.device_args(&[
            "exec-out",
            "sh",
            "-c",
            "while true; do screencap -p; done",
        ]);
        let mut child = Command::new(self.bridge.executable())
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ControllerError::Capture("stream has no stdout".to_string()))?;
        Ok(Arc::new(ScreencapStream {
            reader: Mutex::new((stdout, Vec::new())),
            child: Mutex::new(child),
        }))
    }
}

struct ScreencapStream {
    reader: Mutex<(ChildStdout, Vec<u8>)>,
    child: Mutex<Child>,
}

impl FrameStream for ScreencapStream {
    fn next_frame(&self) -> Result<Option<RgbImage>, ControllerError> {
        let mut guard = lock(&self.reader);
        let (stdout, buf) = &mut *guard;
        let mut chunk = [0u8; 64 * 1024];
        loop {
            if let Some(png) = split_png(buf) {
                let img = image::load_from_memory_with_format(&png, ImageFormat::Png)?;
                return Ok(Some(img.to_rgb8()));
            }
            let n = stdout.read(&mut chunk)?;
            if n == 0 {
                return Ok(None);
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn close(&self) {
        reap(&mut lock(&self.child));
    }
}

impl Drop for ScreencapStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// ffmpeg arguments turning an H.264 elementary stream on stdin into raw
/// RGB frames of a fixed size on stdout
pub fn decoder_args(width: u32, height: u32) -> Vec<String> {
    let scale = format!("scale={width}:{height}");
    [
        "-loglevel", "error", "-fflags", "nobuffer", "-flags", "low_delay", "-f", "h264", "-i",
        "pipe:0", "-vf", scale.as_str(), "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

/// Read one packed RGB frame. `Ok(None)` at end of stream.
pub fn read_raw_frame(
    reader: &mut impl Read,
    width: u32,
    height: u32,
) -> Result<Option<RgbImage>, ControllerError> {
    let mut buf = vec![0u8; width as usize * height as usize * 3];
    match reader.read_exact(&mut buf) {
        Ok(()) => RgbImage::from_raw(width, height, buf)
            .map(Some)
            .ok_or_else(|| ControllerError::Capture("raw frame size mismatch".to_string())),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// `screenrecord` H.264 piped through an ffmpeg decoder
struct VideoSource {
    bridge: AdbBridge,
    ffmpeg: PathBuf,
}

impl FrameSource for VideoSource {
    fn open(&self) -> Result<Arc<dyn FrameStream>, ControllerError> {
        // the decoder needs the frame size up front; the current orientation decides it
        let (width, height) = self.bridge.screencap()?.dimensions();
        let argv = self.bridge.device_args(&[
            "exec-out",
            "screenrecord",
            "--output-format=h264",
            "--time-limit",
            SCREENRECORD_LIMIT,
            "-",
        ]);
        let mut recorder = Command::new(self.bridge.executable())
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let Some(h264) = recorder.stdout.take() else {
            reap(&mut recorder);
            return Err(ControllerError::Capture("recorder has no stdout".to_string()));
        };

        let mut decoder = match Command::new(&self.ffmpeg)
            .args(decoder_args(width, height))
            .stdin(Stdio::from(h264))
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(decoder) => decoder,
            Err(e) => {
                reap(&mut recorder);
                return Err(e.into());
            }
        };
        let Some(raw) = decoder.stdout.take() else {
            reap(&mut decoder);
            reap(&mut recorder);
            return Err(ControllerError::Capture("decoder has no stdout".to_string()));
        };
        log::debug!("[Mirror] video stream {}x{}", width, height);

        Ok(Arc::new(VideoStream {
            reader: Mutex::new(raw),
            children: Mutex::new(vec![decoder, recorder]),
            size: (width, height),
        }))
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

struct VideoStream {
    reader: Mutex<ChildStdout>,
    children: Mutex<Vec<Child>>,
    size: (u32, u32),
}

impl FrameStream for VideoStream {
    fn next_frame(&self) -> Result<Option<RgbImage>, ControllerError> {
        let (width, height) = self.size;
        read_raw_frame(&mut *lock(&self.reader), width, height)
    }

    fn close(&self) {
        lock(&self.children).iter_mut().for_each(reap);
    }

    fn changes_only(&self) -> bool {
        true
    }
}

impl Drop for VideoStream {
    fn drop(&mut self) {
        self.close();
    }
}
