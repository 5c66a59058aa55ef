//! Pixel-space rectangles shared by OCR blocks, faces and bubbles.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle with exclusive right/bottom edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_xywh(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self::new(x, y, x + w, y + h)
    }

    pub fn width(&self) -> i32 {
        (self.right - self.left).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.bottom - self.top).max(0)
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn center_x(&self) -> f32 {
        (self.left as f32 + self.right as f32) / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.top as f32 + self.bottom as f32) / 2.0
    }

    /// Width divided by height; zero for degenerate boxes.
    pub fn aspect_ratio(&self) -> f32 {
        if self.height() == 0 {
            return 0.0;
        }
        self.width() as f32 / self.height() as f32
    }

    pub fn center_distance(&self, other: &Rect) -> f32 {
        let dx = self.center_x() - other.center_x();
        let dy = self.center_y() - other.center_y();
        (dx * dx + dy * dy).sqrt()
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Rect {
        Rect {
            left: self.left + dx,
            top: self.top + dy,
            right: self.right + dx,
            bottom: self.bottom + dy,
        }
    }

    /// Multiply every edge by the given factors, rounding to the nearest pixel.
    pub fn scaled(&self, sx: f32, sy: f32) -> Rect {
        Rect {
            left: (self.left as f32 * sx).round() as i32,
            top: (self.top as f32 * sy).round() as i32,
            right: (self.right as f32 * sx).round() as i32,
            bottom: (self.bottom as f32 * sy).round() as i32,
        }
    }
}
