use image::RgbImage;
use serde::{Deserialize, Serialize};

/// A decoded video frame in packed RGB24.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub sequence: u64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(sequence: u64, image: RgbImage) -> Self {
        Self { sequence, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Axis-aligned face rectangle in frame pixel coordinates.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Intersection with a `frame_width` x `frame_height` frame as
    /// `(x, y, width, height)`. `None` when nothing of the box is on screen.
    pub fn clip_to(&self, frame_width: u32, frame_height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = i64::from(self.x).clamp(0, i64::from(frame_width));
        let y1 = i64::from(self.y).clamp(0, i64::from(frame_height));
        let x2 = (i64::from(self.x) + i64::from(self.width)).clamp(0, i64::from(frame_width));
        let y2 = (i64::from(self.y) + i64::from(self.height)).clamp(0, i64::from(frame_height));
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        // All four values are within [0, frame dimension] after clamping.
        Some((x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32))
    }
}
