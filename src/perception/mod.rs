//! Perception boundary
//!
//! Object detection and OCR are external engines. This module defines the
//! contract the flows depend on, plus [`Perception`], a bundle that turns
//! engine failures into empty results so a flaky service degrades the run
//! instead of ending it.

pub mod debug;
pub mod remote;
pub mod text;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::config::PerceptionSettings;
use crate::geometry::BBox;

pub use debug::DebugStore;
pub use remote::{RemoteDetector, RemoteOcr};
pub use text::{fuzzy_ratio, partial_ratio};

/// One labeled box in frame-local coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub xyxy: BBox,
    pub name: String,
    #[serde(default)]
    pub conf: f32,
}

impl Detection {
    pub fn new(name: impl Into<String>, xyxy: BBox, conf: f32) -> Self {
        Self {
            xyxy,
            name: name.into(),
            conf,
        }
    }
}

/// Inference knobs forwarded to the detector
#[derive(Debug, Clone, PartialEq)]
pub struct DetectParams {
    pub imgsz: u32,
    pub conf: f32,
    pub iou: f32,
    pub agent: String,
}

impl DetectParams {
    pub fn from_settings(cfg: &PerceptionSettings) -> Self {
        Self {
            imgsz: cfg.imgsz,
            conf: cfg.conf,
            iou: cfg.iou,
            agent: cfg.agent.clone(),
        }
    }
}

impl Default for DetectParams {
    fn default() -> Self {
        Self::from_settings(&PerceptionSettings::default())
    }
}

/// Echo of the parameters a detection ran with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionMeta {
    pub backend: Option<String>,
    pub imgsz: Option<u32>,
    pub conf: Option<f32>,
    pub iou: Option<f32>,
    pub tag: Option<String>,
    pub agent: Option<String>,
}

/// Object detector contract
pub trait Detector: Send {
    fn detect(
        &self,
        image: &RgbImage,
        params: &DetectParams,
        tag: &str,
    ) -> Result<(DetectionMeta, Vec<Detection>), PerceptionError>;
}

/// OCR engine contract
pub trait Ocr: Send {
    /// Recognized text joined into one line; words below `min_conf` dropped
    fn text(&self, image: &RgbImage, min_conf: f32) -> Result<String, PerceptionError>;

    /// Integer read from the image
    fn digits(&self, image: &RgbImage) -> Result<i64, PerceptionError>;
}

/// Perception errors
#[derive(Debug, thiserror::Error)]
pub enum PerceptionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Detections whose class is one of `classes`, in their original order
pub fn filter_by_classes<'a>(dets: &'a [Detection], classes: &[&str]) -> Vec<&'a Detection> {
    dets.iter()
        .filter(|d| classes.contains(&d.name.as_str()))
        .collect()
}

/// Sub-image under `bbox`, clipped to the frame
pub fn crop(image: &RgbImage, bbox: &BBox) -> Option<RgbImage> {
    let (x, y, w, h) = bbox.crop_rect(image.width(), image.height())?;
    Some(image::imageops::crop_imm(image, x, y, w, h).to_image())
}

/// A captured frame with what the detector found in it
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub meta: DetectionMeta,
    pub dets: Vec<Detection>,
}

impl Frame {
    pub fn of_class(&self, classes: &[&str]) -> Vec<&Detection> {
        filter_by_classes(&self.dets, classes)
    }

    pub fn has(&self, classes: &[&str]) -> bool {
        self.dets.iter().any(|d| classes.contains(&d.name.as_str()))
    }
}

/// Detector plus optional OCR, with failures degraded to empty results
pub struct Perception {
    detector: Box<dyn Detector>,
    ocr: Option<Box<dyn Ocr>>,
    params: DetectParams,
    debug: Option<DebugStore>,
}

impl Perception {
    pub fn new(detector: Box<dyn Detector>, ocr: Option<Box<dyn Ocr>>, params: DetectParams) -> Self {
        Self {
            detector,
            ocr,
            params,
            debug: None,
        }
    }

    /// HTTP detector and OCR at `cfg.base_url`
    pub fn remote(cfg: &PerceptionSettings) -> Result<Self, PerceptionError> {
        let detector = RemoteDetector::new(cfg)?;
        let ocr = RemoteOcr::new(cfg)?;
        let mut perception = Self::new(
            Box::new(detector),
            Some(Box::new(ocr)),
            DetectParams::from_settings(cfg),
        );
        if let Some(dir) = &cfg.debug_dir {
            perception = perception.with_debug(DebugStore::new(dir, cfg.debug_conf_below));
        }
        Ok(perception)
    }

    pub fn with_debug(mut self, store: DebugStore) -> Self {
        self.debug = Some(store);
        self
    }

    pub fn params(&self) -> &DetectParams {
        &self.params
    }

    pub fn has_ocr(&self) -> bool {
        self.ocr.is_some()
    }

    /// Run detection on `image`; a failing engine yields no detections
    pub fn detect(&self, image: RgbImage, tag: &str) -> Frame {
        let (meta, dets) = match self.detector.detect(&image, &self.params, tag) {
            Ok(found) => found,
            Err(e) => {
                log::warn!("[Perception] detection failed for '{}': {}", tag, e);
                (DetectionMeta::default(), Vec::new())
            }
        };

        if let Some(store) = &self.debug {
            match store.maybe_store(&image, &dets, &self.params.agent, tag) {
                Ok(Some(path)) => log::debug!("[Perception] saved low-conf frame -> {}", path.display()),
                Ok(None) => {}
                Err(e) => log::debug!("[Perception] failed saving debug frame: {}", e),
            }
        }

        Frame { image, meta, dets }
    }

    /// OCR text of `image`, empty when OCR is missing or fails
    pub fn text(&self, image: &RgbImage, min_conf: f32) -> String {
        let Some(ocr) = &self.ocr else {
            return String::new();
        };
        match ocr.text(image, min_conf) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("[Perception] OCR text failed: {}", e);
                String::new()
            }
        }
    }

    /// OCR'd text of the region under `bbox`
    pub fn text_in(&self, image: &RgbImage, bbox: &BBox, min_conf: f32) -> String {
        crop(image, bbox)
            .map(|roi| self.text(&roi, min_conf))
            .unwrap_or_default()
    }

    pub fn digits_in(&self, image: &RgbImage, bbox: &BBox) -> Option<i64> {
        let ocr = self.ocr.as_ref()?;
        let roi = crop(image, bbox)?;
        match ocr.digits(&roi) {
            Ok(n) => Some(n),
            Err(e) => {
                log::warn!("[Perception] OCR digits failed: {}", e);
                None
            }
        }
    }
}
