//! Poll-detect-click synchronization
//!
//! Every navigation step is phrased as "wait until one of these classes is on
//! screen, optionally with text close to one of these strings, then click
//! it". The waiter polls the detector at a fixed cadence until a candidate
//! qualifies or the timeout passes.

use std::time::{Duration, Instant};

use super::{checkpoint, pause, CareerError, Pacing};
use crate::config::WaiterSettings;
use crate::controller::Controller;
use crate::geometry::BBox;
use crate::perception::{fuzzy_ratio, partial_ratio, Detection, Frame, Perception};

/// OCR confidence floor used for button disambiguation
const OCR_MIN_CONF: f32 = 0.2;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(4000);

/// What to wait for and how to click it
#[derive(Debug, Clone)]
pub struct Query<'a> {
    pub classes: &'a [&'a str],
    /// Wanted text fragments; empty means any detection of `classes` qualifies
    pub texts: &'a [&'a str],
    /// Candidates whose text matches any of these are never clicked
    pub forbid: &'a [&'a str],
    /// Minimum fuzzy score; `None` uses the waiter default
    pub threshold: Option<f32>,
    pub timeout: Duration,
    pub clicks: u32,
    /// Diagnostic label forwarded to the detector
    pub tag: String,
}

impl<'a> Query<'a> {
    pub fn new(classes: &'a [&'a str], tag: impl Into<String>) -> Self {
        Self {
            classes,
            texts: &[],
            forbid: &[],
            threshold: None,
            timeout: DEFAULT_TIMEOUT,
            clicks: 1,
            tag: tag.into(),
        }
    }

    pub fn texts(mut self, texts: &'a [&'a str]) -> Self {
        self.texts = texts;
        self
    }

    pub fn forbid(mut self, forbid: &'a [&'a str]) -> Self {
        self.forbid = forbid;
        self
    }

    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout = Duration::from_millis(ms);
        self
    }

    pub fn clicks(mut self, clicks: u32) -> Self {
        self.clicks = clicks.max(1);
        self
    }
}

/// Best score of `text` against any wanted fragment
pub fn text_score(text: &str, wanted: &[&str]) -> f32 {
    wanted
        .iter()
        .map(|w| fuzzy_ratio(text, w).max(partial_ratio(text, w)))
        .fold(0.0, f32::max)
}

/// Whether `text` matches any forbidden fragment at `threshold`
pub fn is_forbidden(text: &str, forbid: &[&str], threshold: f32) -> bool {
    !text.trim().is_empty() && forbid.iter().any(|f| partial_ratio(text, f) >= threshold)
}

/// Pick the candidate to click.
///
/// Candidates are assumed to be ordered by preference. Without text
/// constraints the first one wins. Otherwise each candidate's text is read
/// through `read_text` and the best score at or above `threshold` wins; ties
/// keep the earlier candidate. Returns the index and score.
pub fn choose_candidate(
    candidates: &[&Detection],
    wanted: &[&str],
    forbid: &[&str],
    threshold: f32,
    mut read_text: impl FnMut(&Detection) -> String,
) -> Option<(usize, f32)> {
    if candidates.is_empty() {
        return None;
    }
    if wanted.is_empty() && forbid.is_empty() {
        return Some((0, 1.0));
    }

    let mut best: Option<(usize, f32)> = None;
    for (i, det) in candidates.iter().enumerate() {
        let text = read_text(det);
        if is_forbidden(&text, forbid, threshold) {
            log::debug!("[Waiter] skipping '{}' ({}): forbidden text", text, det.name);
            continue;
        }
        let score = if wanted.is_empty() {
            1.0
        } else {
            text_score(&text, wanted)
        };
        log::trace!("[Waiter] candidate {} '{}' score {:.2}", det.name, text, score);
        if score >= threshold && best.map_or(true, |(_, s)| score > s) {
            best = Some((i, score));
        }
    }
    best
}

/// Couples a controller with perception into retryable UI primitives
pub struct Waiter {
    ctrl: Box<dyn Controller>,
    perception: Perception,
    poll_interval: Duration,
    default_threshold: f32,
    pacing: Pacing,
}

impl Waiter {
    pub fn new(ctrl: Box<dyn Controller>, perception: Perception, cfg: &WaiterSettings) -> Self {
        Self {
            ctrl,
            perception,
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
            default_threshold: cfg.default_threshold,
            pacing: Pacing::real(),
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    pub fn controller(&mut self) -> &mut dyn Controller {
        self.ctrl.as_mut()
    }

    pub fn perception(&self) -> &Perception {
        &self.perception
    }

    /// Fixed settle wait, scaled by the pacing
    pub fn settle(&self, ms: u64) -> Result<(), CareerError> {
        pause(self.pacing.ms(ms))
    }

    /// Capture the default region and run detection on it
    pub fn recognize(&mut self, tag: &str) -> Result<Frame, CareerError> {
        checkpoint()?;
        let region = self.ctrl.default_capture_region();
        let image = self.ctrl.screenshot(region)?;
        Ok(self.perception.detect(image, tag))
    }

    /// OCR'd text under `bbox` in `frame`
    pub fn text_in(&self, frame: &Frame, bbox: &BBox) -> String {
        self.perception.text_in(&frame.image, bbox, OCR_MIN_CONF)
    }

    /// Click a detection from the most recent frame
    pub fn click(&mut self, det: &Detection, clicks: u32) -> Result<(), CareerError> {
        checkpoint()?;
        self.ctrl.click_bbox(&det.xyxy, clicks)?;
        Ok(())
    }

    /// Single look: is any of `classes` on screen right now?
    pub fn seen(&mut self, classes: &[&str], tag: &str) -> Result<bool, CareerError> {
        let frame = self.recognize(tag)?;
        Ok(frame.has(classes))
    }

    /// Poll until a qualifying detection shows up, then click it.
    /// `Ok(false)` on timeout.
    pub fn click_when(&mut self, query: &Query<'_>) -> Result<bool, CareerError> {
        let threshold = query.threshold.unwrap_or(self.default_threshold);
        let deadline = Instant::now() + self.pacing.scale(query.timeout);

        loop {
            let frame = self.recognize(&query.tag)?;
            if let Some((det, score)) = self.pick(&frame, query, threshold) {
                log::debug!(
                    "[Waiter] '{}' clicking {} (conf {:.2}, score {:.2})",
                    query.tag,
                    det.name,
                    det.conf,
                    score
                );
                self.click(&det, query.clicks)?;
                return Ok(true);
            }
            if Instant::now() >= deadline {
                log::debug!("[Waiter] '{}' timed out waiting for {:?}", query.tag, query.classes);
                return Ok(false);
            }
            pause(self.poll_interval.min(deadline.saturating_duration_since(Instant::now())))?;
        }
    }

    fn pick(&self, frame: &Frame, query: &Query<'_>, threshold: f32) -> Option<(Detection, f32)> {
        let mut candidates = frame.of_class(query.classes);
        candidates.sort_by(|a, b| b.conf.total_cmp(&a.conf));

        let needs_text = !(query.texts.is_empty() && query.forbid.is_empty());
        if needs_text && !self.perception.has_ocr() {
            let first = candidates.first()?;
            log::warn!(
                "[Waiter] '{}' has no OCR for text matching, taking most confident {}",
                query.tag,
                first.name
            );
            return Some(((*first).clone(), first.conf));
        }

        let (index, score) = choose_candidate(
            &candidates,
            query.texts,
            query.forbid,
            threshold,
            |det| self.text_in(frame, &det.xyxy),
        )?;
        Some((candidates[index].clone(), score))
    }
}
