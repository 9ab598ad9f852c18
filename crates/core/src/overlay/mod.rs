//! Optional live view of what the loop is classifying, and the cancellation
//! hook that comes with it.

use crate::emotion::EmotionLabel;
use crate::frame::{BoundingBox, Frame};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const BANNER_HEIGHT: u32 = 12;
const BOX_THICKNESS: i32 = 2;
const NO_LABEL_COLOR: Rgb<u8> = Rgb([128, 128, 128]);

#[derive(thiserror::Error, Debug)]
pub enum OverlayError {
    #[error("failed to write preview {path}: {reason}")]
    Write { path: String, reason: String },
}

/// Shared flag an external party trips to ask a live loop to stop.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub trait Overlay {
    /// Show a classified frame. Purely observational.
    fn present(
        &mut self,
        frame: &Frame,
        face: Option<BoundingBox>,
        label: Option<EmotionLabel>,
    ) -> Result<(), OverlayError>;

    /// Polled between iterations.
    fn cancel_requested(&self) -> bool;
}

impl<T: Overlay + ?Sized> Overlay for Box<T> {
    fn present(
        &mut self,
        frame: &Frame,
        face: Option<BoundingBox>,
        label: Option<EmotionLabel>,
    ) -> Result<(), OverlayError> {
        (**self).present(frame, face, label)
    }

    fn cancel_requested(&self) -> bool {
        (**self).cancel_requested()
    }
}

/// Writes every presented frame, annotated, to a single preview image that
/// an external viewer can watch.
pub struct SnapshotOverlay {
    path: PathBuf,
    cancel: CancelToken,
}

impl SnapshotOverlay {
    pub fn new(path: impl Into<PathBuf>, cancel: CancelToken) -> Self {
        Self {
            path: path.into(),
            cancel,
        }
    }
}

impl Overlay for SnapshotOverlay {
    fn present(
        &mut self,
        frame: &Frame,
        face: Option<BoundingBox>,
        label: Option<EmotionLabel>,
    ) -> Result<(), OverlayError> {
        annotate(frame, face, label)
            .save(&self.path)
            .map_err(|e| OverlayError::Write {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })
    }

    fn cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

pub fn label_color(label: Option<EmotionLabel>) -> Rgb<u8> {
    match label {
        Some(EmotionLabel::Anger) => Rgb([220, 40, 40]),
        Some(EmotionLabel::Disgust) => Rgb([110, 160, 40]),
        Some(EmotionLabel::Fear) => Rgb([140, 60, 180]),
        Some(EmotionLabel::Happiness) => Rgb([250, 200, 30]),
        Some(EmotionLabel::Neutral) => Rgb([230, 230, 230]),
        Some(EmotionLabel::Sadness) => Rgb([40, 90, 220]),
        Some(EmotionLabel::Surprise) => Rgb([250, 130, 20]),
        None => NO_LABEL_COLOR,
    }
}

/// Copy of the frame with the face outlined and a banner across the top, both
/// in the label's colour.
pub fn annotate(frame: &Frame, face: Option<BoundingBox>, label: Option<EmotionLabel>) -> RgbImage {
    let mut img = frame.image.clone();
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img;
    }
    let color = label_color(label);

    if let Some(b) = face.filter(|b| b.width > 0 && b.height > 0) {
        for inset in 0..BOX_THICKNESS {
            let bw = b.width.saturating_sub(2 * inset as u32);
            let bh = b.height.saturating_sub(2 * inset as u32);
            if bw == 0 || bh == 0 {
                break;
            }
            let rect = Rect::at(b.x + inset, b.y + inset).of_size(bw, bh);
            draw_hollow_rect_mut(&mut img, rect, color);
        }
    }

    draw_filled_rect_mut(&mut img, Rect::at(0, 0).of_size(w, BANNER_HEIGHT.min(h)), color);
    img
}
