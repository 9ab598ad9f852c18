//! Crop-to-face, resize and tensor conversion ahead of classification.

use crate::face::{FaceError, FaceLocator};
use crate::frame::{BoundingBox, Frame};
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Square input edge of the reference emotion CNN.
pub const DEFAULT_INPUT_SIZE: u32 = 80;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    Rgb,
    /// The reference weights were trained on BGR-decoded images.
    #[default]
    Bgr,
}

/// `[1, 3, height, width]` CHW tensor with values in `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct InputTensor {
    pub shape: [usize; 4],
    pub data: Vec<f32>,
}

#[derive(thiserror::Error, Debug)]
pub enum PreprocessError {
    #[error("face localisation failed: {0}")]
    FaceLocator(#[from] FaceError),

    #[error("crop region is empty (box {0:?} on a {1}x{2} frame)")]
    EmptyRegion(Option<BoundingBox>, u32, u32),
}

/// What [`FramePreprocessor::prepare`] produced for one frame.
#[derive(Clone, Debug)]
pub struct Prepared {
    pub tensor: InputTensor,
    /// Face the crop was taken from; `None` when the whole frame was used.
    pub face: Option<BoundingBox>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PreprocessConfig {
    pub input_width: u32,
    pub input_height: u32,
    pub channel_order: ChannelOrder,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
            channel_order: ChannelOrder::default(),
        }
    }
}

pub struct FramePreprocessor<L> {
    locator: L,
    config: PreprocessConfig,
}

impl<L: FaceLocator> FramePreprocessor<L> {
    pub fn new(locator: L, config: PreprocessConfig) -> Self {
        Self { locator, config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Crops to the first located face, or keeps the whole frame when none is
    /// found, then resizes and converts to the classifier's tensor layout.
    pub fn prepare(&mut self, frame: &Frame) -> Result<Prepared, PreprocessError> {
        let face = self.locator.locate(frame)?.into_iter().next();
        let region = crop_region(&frame.image, face)?;
        let resized = imageops::resize(
            &region,
            self.config.input_width,
            self.config.input_height,
            FilterType::Triangle,
        );
        Ok(Prepared {
            tensor: to_tensor(&resized, self.config.channel_order),
            face,
        })
    }
}

fn crop_region(image: &RgbImage, face: Option<BoundingBox>) -> Result<RgbImage, PreprocessError> {
    let (w, h) = image.dimensions();
    let empty = || PreprocessError::EmptyRegion(face, w, h);
    match face {
        Some(b) => {
            let (x, y, cw, ch) = b.clip_to(w, h).ok_or_else(empty)?;
            Ok(imageops::crop_imm(image, x, y, cw, ch).to_image())
        }
        None if w == 0 || h == 0 => Err(empty()),
        None => Ok(image.clone()),
    }
}

fn to_tensor(image: &RgbImage, order: ChannelOrder) -> InputTensor {
    let (w, h) = image.dimensions();
    let plane = (w as usize) * (h as usize);
    let channels = match order {
        ChannelOrder::Rgb => [0usize, 1, 2],
        ChannelOrder::Bgr => [2usize, 1, 0],
    };
    let mut data = vec![0f32; 3 * plane];
    for (idx, px) in image.pixels().enumerate() {
        for (c, &src) in channels.iter().enumerate() {
            data[c * plane + idx] = f32::from(px[src]) / 255.0;
        }
    }
    InputTensor {
        shape: [1, 3, h as usize, w as usize],
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::NoFaceLocator;
    use image::Rgb;

    struct FixedLocator(Vec<BoundingBox>);

    impl FaceLocator for FixedLocator {
        fn locate(&mut self, _frame: &Frame) -> Result<Vec<BoundingBox>, FaceError> {
            Ok(self.0.clone())
        }
    }

    fn two_tone_frame() -> Frame {
        // Left half red, right half blue.
        let img = RgbImage::from_fn(40, 20, |x, _| {
            if x < 20 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        Frame::new(0, img)
    }

    #[test]
    fn tensor_has_model_shape() {
        let mut p = FramePreprocessor::new(NoFaceLocator::new(), PreprocessConfig::default());
        let out = p.prepare(&two_tone_frame()).expect("prepare");
        assert_eq!(out.tensor.shape, [1, 3, 80, 80]);
        assert_eq!(out.tensor.data.len(), 3 * 80 * 80);
        assert!(out.face.is_none());
    }

    #[test]
    fn crops_to_first_face() {
        let boxes = vec![BoundingBox::new(20, 0, 20, 20), BoundingBox::new(0, 0, 20, 20)];
        let config = PreprocessConfig {
            channel_order: ChannelOrder::Rgb,
            ..PreprocessConfig::default()
        };
        let mut p = FramePreprocessor::new(FixedLocator(boxes), config);
        let out = p.prepare(&two_tone_frame()).expect("prepare");
        assert_eq!(out.face, Some(BoundingBox::new(20, 0, 20, 20)));

        // Entirely blue crop: R plane 0, B plane 1.
        let plane = 80 * 80;
        assert!(out.tensor.data[..plane].iter().all(|&v| v == 0.0));
        assert!(out.tensor.data[2 * plane..].iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn bgr_order_swaps_outer_planes() {
        let img = RgbImage::from_pixel(4, 4, Rgb([255, 128, 0]));
        let t = to_tensor(&img, ChannelOrder::Bgr);
        let plane = 16;
        assert_eq!(t.data[0], 0.0);
        assert!((t.data[plane] - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(t.data[2 * plane], 1.0);
    }

    #[test]
    fn degenerate_box_is_an_error() {
        let mut p = FramePreprocessor::new(
            FixedLocator(vec![BoundingBox::new(5, 5, 0, 10)]),
            PreprocessConfig::default(),
        );
        let err = p.prepare(&two_tone_frame()).unwrap_err();
        assert!(matches!(err, PreprocessError::EmptyRegion(Some(_), 40, 20)));
    }

    #[test]
    fn empty_frame_without_face_is_an_error() {
        let mut p = FramePreprocessor::new(NoFaceLocator::new(), PreprocessConfig::default());
        let err = p.prepare(&Frame::new(0, RgbImage::new(0, 0))).unwrap_err();
        assert!(matches!(err, PreprocessError::EmptyRegion(None, 0, 0)));
    }
}
