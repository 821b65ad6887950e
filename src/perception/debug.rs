//! Low-confidence frame capture for later labeling

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use super::{Detection, PerceptionError};

const LOW_COLOR: Rgb<u8> = Rgb([255, 40, 40]);
const OK_COLOR: Rgb<u8> = Rgb([40, 220, 40]);

/// Saves frames whose detections include a low-confidence box
///
/// Layout: `<root>/<agent>/<tag>/raw/*.png` plus an `annotated/` sibling with
/// every box drawn, low-confidence ones in red.
#[derive(Debug, Clone)]
pub struct DebugStore {
    root: PathBuf,
    threshold: f32,
}

impl DebugStore {
    pub fn new(root: impl Into<PathBuf>, threshold: f32) -> Self {
        Self {
            root: root.into(),
            threshold,
        }
    }

    fn tag_dir(&self, agent: &str, tag: &str) -> PathBuf {
        let agent = agent.trim();
        let base = if agent.is_empty() {
            self.root.clone()
        } else {
            self.root.join(sanitize(agent))
        };
        base.join(sanitize(tag))
    }

    /// Store `image` if any detection is at or below the threshold.
    /// Returns the raw frame path when something was written.
    pub fn maybe_store(
        &self,
        image: &RgbImage,
        dets: &[Detection],
        agent: &str,
        tag: &str,
    ) -> Result<Option<PathBuf>, PerceptionError> {
        let Some(lowest) = dets
            .iter()
            .filter(|d| d.conf <= self.threshold)
            .min_by(|a, b| a.conf.total_cmp(&b.conf))
        else {
            return Ok(None);
        };

        let dir = self.tag_dir(agent, tag);
        let file = format!(
            "{}_{}_{}_{:.2}.png",
            sanitize(tag),
            timestamp_ms(),
            sanitize(&lowest.name),
            lowest.conf
        );

        let raw = dir.join("raw").join(&file);
        save_png(image, &raw)?;

        let mut annotated = image.clone();
        for det in dets {
            let color = if det.conf <= self.threshold { LOW_COLOR } else { OK_COLOR };
            if let Some(rect) = rect_of(det, image.width(), image.height()) {
                draw_hollow_rect_mut(&mut annotated, rect, color);
            }
        }
        save_png(&annotated, &dir.join("annotated").join(&file))?;

        Ok(Some(raw))
    }
}

fn save_png(image: &RgbImage, path: &Path) -> Result<(), PerceptionError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    image.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

fn rect_of(det: &Detection, width: u32, height: u32) -> Option<Rect> {
    let (x, y, w, h) = det.xyxy.crop_rect(width, height)?;
    Some(Rect::at(x as i32, y as i32).of_size(w.max(1), h.max(1)))
}

fn timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Path-safe segment: anything but alphanumerics, `-` and `_` becomes `-`
fn sanitize(segment: &str) -> String {
    let cleaned: String = segment
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;

    fn dets() -> Vec<Detection> {
        vec![
            Detection::new("button_green", BBox::new(2.0, 2.0, 12.0, 8.0), 0.92),
            Detection::new("ui/home", BBox::new(20.0, 10.0, 30.0, 20.0), 0.41),
        ]
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("ui/home"), "ui-home");
        assert_eq!(sanitize("  "), "unknown");
        assert_eq!(sanitize("career_nav-1"), "career_nav-1");
    }

    #[test]
    fn test_skips_confident_frames() {
        let dir = tempfile::tempdir().unwrap();
        let store = DebugStore::new(dir.path(), 0.3);
        let saved = store
            .maybe_store(&RgbImage::new(40, 30), &dets(), "career_loop", "probe")
            .unwrap();
        assert!(saved.is_none());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_stores_raw_and_annotated() {
        let dir = tempfile::tempdir().unwrap();
        let store = DebugStore::new(dir.path(), 0.6);
        let raw = store
            .maybe_store(&RgbImage::new(40, 30), &dets(), "career_loop", "probe")
            .unwrap()
            .unwrap();

        let tag_dir = dir.path().join("career_loop").join("probe");
        assert!(raw.starts_with(tag_dir.join("raw")));
        let name = raw.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("probe_"));
        assert!(name.ends_with("_ui-home_0.41.png"));

        let annotated = image::open(tag_dir.join("annotated").join(&name)).unwrap().to_rgb8();
        assert_eq!(annotated.get_pixel(20, 10).0, LOW_COLOR.0);
        assert_eq!(annotated.get_pixel(2, 2).0, OK_COLOR.0);
    }
}
