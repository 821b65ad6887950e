//! Scripted stand-ins for the controller, perception and training agent

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::RgbImage;

use super::agent::{ResettableState, TrainingAgent};
use super::waiter::Waiter;
use super::{CareerError, Pacing};
use crate::config::WaiterSettings;
use crate::controller::{
    ClickOptions, Controller, ControllerError, ControllerState, ScrollOptions, ScrollTarget,
};
use crate::geometry::{BBox, Region};
use crate::perception::{
    DetectParams, Detection, DetectionMeta, Detector, Ocr, Perception, PerceptionError,
};

pub(crate) const FRAME: (u32, u32) = (1280, 720);

pub(crate) fn det(name: &str, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
    Detection::new(name, BBox::new(x1, y1, x2, y2), 0.9)
}

/// Everything the fake controller was asked to do
#[derive(Debug, Default)]
pub(crate) struct ControlLog {
    pub clicks: Vec<(i32, i32, u32)>,
    pub screenshots: u32,
}

pub(crate) struct FakeController {
    state: ControllerState,
    origin: (i32, i32),
    log: Arc<Mutex<ControlLog>>,
}

impl Controller for FakeController {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn state(&self) -> &ControllerState {
        &self.state
    }

    fn focus(&mut self) -> bool {
        true
    }

    fn screenshot(&mut self, region: Option<Region>) -> Result<RgbImage, ControllerError> {
        let region =
            region.unwrap_or_else(|| Region::new(self.origin.0, self.origin.1, FRAME.0, FRAME.1));
        self.state.record_capture(region);
        self.log.lock().unwrap().screenshots += 1;
        Ok(RgbImage::new(region.width, region.height))
    }

    fn click(&mut self, x: i32, y: i32, opts: ClickOptions) -> Result<(), ControllerError> {
        self.log.lock().unwrap().clicks.push((x, y, opts.clicks));
        Ok(())
    }

    fn mouse_down(&mut self, _x: i32, _y: i32) -> Result<(), ControllerError> {
        Ok(())
    }

    fn mouse_up(&mut self, _x: i32, _y: i32) -> Result<(), ControllerError> {
        Ok(())
    }

    fn hold(&mut self, _x: i32, _y: i32, _duration: Duration) -> Result<(), ControllerError> {
        Ok(())
    }

    fn scroll(
        &mut self,
        _target: ScrollTarget,
        _opts: &ScrollOptions,
    ) -> Result<bool, ControllerError> {
        Ok(true)
    }
}

#[derive(Default)]
struct ScriptState {
    queued: HashMap<String, VecDeque<Vec<Detection>>>,
    always: HashMap<String, Vec<Detection>>,
    calls: Vec<String>,
}

/// Detector answers keyed by tag prefix; the longest matching key wins.
/// Queued answers are consumed first, then the standing answer applies.
#[derive(Clone, Default)]
pub(crate) struct Script(Arc<Mutex<ScriptState>>);

impl Script {
    pub fn once(&self, tag: &str, dets: Vec<Detection>) {
        let mut s = self.0.lock().unwrap();
        s.queued.entry(tag.to_string()).or_default().push_back(dets);
    }

    pub fn always(&self, tag: &str, dets: Vec<Detection>) {
        self.0.lock().unwrap().always.insert(tag.to_string(), dets);
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().calls.clone()
    }

    /// Detector calls whose tag starts with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|t| t.starts_with(prefix)).count()
    }

    fn next(&self, tag: &str) -> Vec<Detection> {
        let mut s = self.0.lock().unwrap();
        s.calls.push(tag.to_string());

        let mut keys: Vec<String> = s
            .queued
            .keys()
            .chain(s.always.keys())
            .filter(|k| tag.starts_with(k.as_str()))
            .cloned()
            .collect();
        keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        keys.dedup();

        for key in keys {
            if let Some(dets) = s.queued.get_mut(&key).and_then(|q| q.pop_front()) {
                return dets;
            }
            if let Some(dets) = s.always.get(&key) {
                return dets.clone();
            }
        }
        Vec::new()
    }
}

struct ScriptedDetector(Script);

impl Detector for ScriptedDetector {
    fn detect(
        &self,
        _image: &RgbImage,
        _params: &DetectParams,
        tag: &str,
    ) -> Result<(DetectionMeta, Vec<Detection>), PerceptionError> {
        Ok((DetectionMeta::default(), self.0.next(tag)))
    }
}

#[derive(Default)]
struct LabelState {
    texts: HashMap<(u32, u32), String>,
    digits: HashMap<(u32, u32), i64>,
}

/// OCR answers keyed by the crop size of a box, so tests give every
/// labeled box a distinct size.
#[derive(Clone, Default)]
pub(crate) struct Labels(Arc<Mutex<LabelState>>);

fn size_key(bbox: &BBox) -> (u32, u32) {
    bbox.crop_rect(FRAME.0, FRAME.1)
        .map(|(_, _, w, h)| (w, h))
        .unwrap_or_default()
}

impl Labels {
    pub fn text(&self, bbox: &BBox, text: &str) {
        self.0.lock().unwrap().texts.insert(size_key(bbox), text.to_string());
    }

    pub fn digits(&self, bbox: &BBox, value: i64) {
        self.0.lock().unwrap().digits.insert(size_key(bbox), value);
    }
}

struct ScriptedOcr(Labels);

impl Ocr for ScriptedOcr {
    fn text(&self, image: &RgbImage, _min_conf: f32) -> Result<String, PerceptionError> {
        let labels = self.0 .0.lock().unwrap();
        Ok(labels.texts.get(&image.dimensions()).cloned().unwrap_or_default())
    }

    fn digits(&self, image: &RgbImage) -> Result<i64, PerceptionError> {
        let labels = self.0 .0.lock().unwrap();
        labels
            .digits
            .get(&image.dimensions())
            .copied()
            .ok_or_else(|| PerceptionError::Malformed("no digits".into()))
    }
}

/// Counters shared with a [`FakeAgent`]
#[derive(Clone, Default)]
pub(crate) struct AgentProbe {
    pub runs: Arc<AtomicU32>,
    pub stops: Arc<AtomicU32>,
    pub resets: Arc<AtomicU32>,
}

impl AgentProbe {
    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> u32 {
        self.resets.load(Ordering::SeqCst)
    }
}

type RunHook = Box<dyn FnMut(u32) -> Result<(), CareerError> + Send>;

pub(crate) struct FakeAgent {
    probe: AgentProbe,
    resettable: bool,
    on_run: Option<RunHook>,
}

impl FakeAgent {
    pub fn new(probe: AgentProbe) -> Self {
        Self {
            probe,
            resettable: true,
            on_run: None,
        }
    }

    pub fn not_resettable(mut self) -> Self {
        self.resettable = false;
        self
    }

    /// Called with the 1-based run number
    pub fn on_run(mut self, hook: impl FnMut(u32) -> Result<(), CareerError> + Send + 'static) -> Self {
        self.on_run = Some(Box::new(hook));
        self
    }
}

impl ResettableState for FakeAgent {
    fn reset_for_new_career(&mut self) {
        self.probe.resets.fetch_add(1, Ordering::SeqCst);
    }
}

impl TrainingAgent for FakeAgent {
    fn run(&mut self) -> Result<(), CareerError> {
        let n = self.probe.runs.fetch_add(1, Ordering::SeqCst) + 1;
        match &mut self.on_run {
            Some(hook) => hook(n),
            None => Ok(()),
        }
    }

    fn emergency_stop(&self) {
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn resettable(&mut self) -> Option<&mut dyn ResettableState> {
        if self.resettable {
            Some(self)
        } else {
            None
        }
    }
}

/// A fake controller, scripted perception and their shared probes
pub(crate) struct Rig {
    pub script: Script,
    pub ocr: Labels,
    pub log: Arc<Mutex<ControlLog>>,
    origin: (i32, i32),
}

impl Rig {
    pub fn new() -> Self {
        Self::with_origin(0, 0)
    }

    pub fn with_origin(x: i32, y: i32) -> Self {
        Self {
            script: Script::default(),
            ocr: Labels::default(),
            log: Arc::default(),
            origin: (x, y),
        }
    }

    fn controller(&self) -> Box<dyn Controller> {
        Box::new(FakeController {
            state: ControllerState::new(None, true),
            origin: self.origin,
            log: Arc::clone(&self.log),
        })
    }

    fn settings() -> WaiterSettings {
        WaiterSettings {
            poll_interval_ms: 10,
            ..WaiterSettings::default()
        }
    }

    /// Waiter with instant pacing: every query polls exactly once
    pub fn waiter(&self) -> Waiter {
        let perception = Perception::new(
            Box::new(ScriptedDetector(self.script.clone())),
            Some(Box::new(ScriptedOcr(self.ocr.clone()))),
            DetectParams::default(),
        );
        Waiter::new(self.controller(), perception, &Self::settings()).with_pacing(Pacing::instant())
    }

    pub fn waiter_without_ocr(&self) -> Waiter {
        let perception = Perception::new(
            Box::new(ScriptedDetector(self.script.clone())),
            None,
            DetectParams::default(),
        );
        Waiter::new(self.controller(), perception, &Self::settings()).with_pacing(Pacing::instant())
    }

    pub fn clicks(&self) -> Vec<(i32, i32, u32)> {
        self.log.lock().unwrap().clicks.clone()
    }
}
