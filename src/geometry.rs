//! Screen geometry primitives
//!
//! `Region` is an integer screen rectangle used for capture; `BBox` is a
//! float detection box in frame-local pixels.

use serde::{Deserialize, Serialize};

/// A capturable rectangle in screen pixels: `(left, top, width, height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.left + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height as i32
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Left half of this region, keeping the full height.
    pub fn left_half(&self) -> Self {
        Self {
            width: self.width / 2,
            ..*self
        }
    }

    /// Intersection with `other`, or `None` when they do not overlap.
    pub fn intersect(&self, other: &Region) -> Option<Region> {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return None;
        }
        Some(Region::new(
            left,
            top,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }

    /// Same rectangle as a float box.
    pub fn to_bbox(&self) -> BBox {
        BBox::new(
            self.left as f32,
            self.top as f32,
            self.right() as f32,
            self.bottom() as f32,
        )
    }
}

/// Axis-aligned box `(x1, y1, x2, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl From<[f32; 4]> for BBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f32; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// A box is valid when it has positive extent on both axes.
    pub fn is_valid(&self) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Inclusive containment of a point.
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }

    /// Whether the center of `inner` lies inside this box.
    pub fn contains_center_of(&self, inner: &BBox) -> bool {
        let (cx, cy) = inner.center();
        self.contains_point(cx, cy)
    }

    /// Integer click target: the rounded center, pulled back inside the box
    /// so rounding never lands on a neighbouring pixel outside it.
    pub fn click_point(&self) -> (i32, i32) {
        let (cx, cy) = self.center();
        (
            clamp_axis(cx.round(), self.x1, self.x2),
            clamp_axis(cy.round(), self.y1, self.y2),
        )
    }

    /// Crop rectangle `(x, y, w, h)` clipped to an image of `width x height`.
    pub fn crop_rect(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = self.x1.floor().max(0.0) as u32;
        let y1 = self.y1.floor().max(0.0) as u32;
        let x2 = (self.x2.ceil().max(0.0) as u32).min(width);
        let y2 = (self.y2.ceil().max(0.0) as u32).min(height);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

fn clamp_axis(v: f32, lo: f32, hi: f32) -> i32 {
    let min = lo.ceil();
    let max = hi.floor();
    if min > max {
        // Sub-pixel box: no integer lies inside, take the nearest one.
        return v as i32;
    }
    v.clamp(min, max) as i32
}
