#[cfg(feature = "onnx")]
mod ultraface;

use crate::frame::{BoundingBox, Frame};

#[cfg(feature = "onnx")]
pub use ultraface::OnnxFaceLocator;

#[derive(thiserror::Error, Debug)]
pub enum FaceError {
    #[error("face model load failed ({path}): {reason}")]
    ModelLoad { path: String, reason: String },

    #[error("face inference failed: {0}")]
    Inference(String),
}

/// Finds faces in a frame.
///
/// Boxes come back highest confidence first; an empty list means no face was
/// found and is not an error.
pub trait FaceLocator {
    fn locate(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, FaceError>;
}

impl<T: FaceLocator + ?Sized> FaceLocator for Box<T> {
    fn locate(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, FaceError> {
        (**self).locate(frame)
    }
}

/// Never finds a face, so every frame is classified whole.
#[derive(Clone, Debug, Default)]
pub struct NoFaceLocator;

impl NoFaceLocator {
    pub fn new() -> Self {
        Self
    }
}

impl FaceLocator for NoFaceLocator {
    fn locate(&mut self, _frame: &Frame) -> Result<Vec<BoundingBox>, FaceError> {
        Ok(Vec::new())
    }
}
