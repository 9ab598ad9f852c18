//! UltraFace (RFB-320) face detector on ONNX Runtime.
//!
//! Input `[1, 3, 240, 320]` RGB normalised as `(p - 127) / 128`; outputs
//! `scores [1, N, 2]` (background, face) and `boxes [1, N, 4]` holding
//! normalised corner coordinates.

use crate::face::{FaceError, FaceLocator};
use crate::frame::{BoundingBox, Frame};
use image::imageops::{self, FilterType};
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use tracing::debug;

const INPUT_WIDTH: u32 = 320;
const INPUT_HEIGHT: u32 = 240;
const PIXEL_MEAN: f32 = 127.0;
const PIXEL_SCALE: f32 = 128.0;
/// Minimum face score for a candidate to survive.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.7;
/// IoU above which the lower-scoring of two candidates is suppressed.
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.3;

pub struct OnnxFaceLocator {
    session: Session,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl OnnxFaceLocator {
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self, FaceError> {
        let path = model_path.as_ref();
        let load_err = |e: ort::Error| FaceError::ModelLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        };
        let session = Session::builder()
            .map_err(load_err)?
            .commit_from_file(path)
            .map_err(load_err)?;

        Ok(Self {
            session,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        })
    }

    pub fn with_thresholds(mut self, confidence: f32, iou: f32) -> Self {
        self.confidence_threshold = confidence.clamp(0.0, 1.0);
        self.iou_threshold = iou.clamp(0.0, 1.0);
        self
    }

    fn input_tensor(frame: &Frame) -> Result<Tensor<f32>, FaceError> {
        let resized = imageops::resize(&frame.image, INPUT_WIDTH, INPUT_HEIGHT, FilterType::Triangle);
        let plane = (INPUT_WIDTH * INPUT_HEIGHT) as usize;
        let mut data = vec![0f32; 3 * plane];
        for (idx, px) in resized.pixels().enumerate() {
            for c in 0..3 {
                data[c * plane + idx] = (f32::from(px[c]) - PIXEL_MEAN) / PIXEL_SCALE;
            }
        }
        let shape = [1usize, 3, INPUT_HEIGHT as usize, INPUT_WIDTH as usize];
        Tensor::from_array((shape, data.into_boxed_slice()))
            .map_err(|e| FaceError::Inference(format!("failed to build input tensor: {e}")))
    }
}

impl FaceLocator for OnnxFaceLocator {
    fn locate(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, FaceError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }

        let input = Self::input_tensor(frame)?;
        let outputs = self
            .session
            .run(ort::inputs!["input" => input])
            .map_err(|e| FaceError::Inference(e.to_string()))?;

        let (_, scores) = outputs["scores"]
            .try_extract_tensor::<f32>()
            .map_err(|e| FaceError::Inference(format!("failed to extract scores: {e}")))?;
        let (_, boxes) = outputs["boxes"]
            .try_extract_tensor::<f32>()
            .map_err(|e| FaceError::Inference(format!("failed to extract boxes: {e}")))?;

        let candidates = decode_candidates(
            scores,
            boxes,
            frame.width(),
            frame.height(),
            self.confidence_threshold,
        )?;
        let kept = nms(candidates, self.iou_threshold);
        debug!(faces = kept.len(), "face localisation done");

        Ok(kept.into_iter().map(|c| c.to_bounding_box()).collect())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }

    fn to_bounding_box(self) -> BoundingBox {
        let x = self.x1.round();
        let y = self.y1.round();
        BoundingBox::new(
            x as i32,
            y as i32,
            (self.x2.round() - x).max(0.0) as u32,
            (self.y2.round() - y).max(0.0) as u32,
        )
    }
}

/// Turn raw model output into frame-space candidates above `threshold`.
fn decode_candidates(
    scores: &[f32],
    boxes: &[f32],
    frame_width: u32,
    frame_height: u32,
    threshold: f32,
) -> Result<Vec<Candidate>, FaceError> {
    if scores.len() % 2 != 0 || boxes.len() % 4 != 0 || scores.len() / 2 != boxes.len() / 4 {
        return Err(FaceError::Inference(format!(
            "mismatched output sizes: scores={} boxes={}",
            scores.len(),
            boxes.len()
        )));
    }

    let fw = frame_width as f32;
    let fh = frame_height as f32;
    Ok(scores
        .chunks_exact(2)
        .zip(boxes.chunks_exact(4))
        .filter(|(s, _)| s[1] >= threshold)
        .map(|(s, b)| Candidate {
            x1: (b[0] * fw).clamp(0.0, fw),
            y1: (b[1] * fh).clamp(0.0, fh),
            x2: (b[2] * fw).clamp(0.0, fw),
            y2: (b[3] * fh).clamp(0.0, fh),
            score: s[1],
        })
        .filter(|c| c.area() > 0.0)
        .collect())
}

/// Greedy NMS; the result is sorted by score, highest first.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Candidate> = Vec::new();
    let mut suppressed = vec![false; candidates.len()];
    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        kept.push(candidates[i]);
        for j in (i + 1)..candidates.len() {
            if candidates[i].iou(&candidates[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_scales_to_frame_and_filters() {
        let scores = [0.9, 0.1, 0.2, 0.8, 0.5, 0.5];
        let boxes = [
            0.0, 0.0, 0.5, 0.5, //
            0.25, 0.25, 0.75, 1.2, //
            0.1, 0.1, 0.2, 0.2,
        ];
        let out = decode_candidates(&scores, &boxes, 200, 100, 0.7).expect("decode");
        assert_eq!(out.len(), 1);
        let c = out[0];
        assert_eq!((c.x1, c.y1, c.x2, c.y2), (50.0, 25.0, 150.0, 100.0));
        assert!((c.score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn decode_rejects_mismatched_outputs() {
        assert!(decode_candidates(&[0.1, 0.9], &[0.0; 8], 10, 10, 0.5).is_err());
    }

    #[test]
    fn nms_keeps_best_of_overlapping_and_orders_by_score() {
        let a = Candidate { x1: 0.0, y1: 0.0, x2: 10.0, y2: 10.0, score: 0.8 };
        let b = Candidate { x1: 1.0, y1: 1.0, x2: 11.0, y2: 11.0, score: 0.95 };
        let c = Candidate { x1: 50.0, y1: 50.0, x2: 60.0, y2: 60.0, score: 0.75 };
        let kept = nms(vec![a, c, b], 0.3);
        assert_eq!(kept, vec![b, c]);
    }

    #[test]
    fn candidate_rounds_to_pixel_box() {
        let c = Candidate { x1: 10.4, y1: 5.6, x2: 30.5, y2: 25.2, score: 1.0 };
        assert_eq!(c.to_bounding_box(), BoundingBox::new(10, 6, 21, 19));
    }
}
