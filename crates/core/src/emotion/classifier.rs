use crate::emotion::EmotionLabel;
use crate::preprocess::InputTensor;

#[derive(thiserror::Error, Debug)]
pub enum ClassifyError {
    #[error("classifier model load failed ({path}): {reason}")]
    ModelLoad { path: String, reason: String },

    #[error("classifier inference failed: {0}")]
    Inference(String),

    #[error("classifier produced {got} outputs, expected {expected}")]
    UnexpectedOutput { expected: usize, got: usize },
}

/// Maps one preprocessed tensor to one label.
pub trait EmotionClassifier {
    fn classify(&mut self, tensor: &InputTensor) -> Result<EmotionLabel, ClassifyError>;
}

impl<T: EmotionClassifier + ?Sized> EmotionClassifier for Box<T> {
    fn classify(&mut self, tensor: &InputTensor) -> Result<EmotionLabel, ClassifyError> {
        (**self).classify(tensor)
    }
}

/// Index of the largest logit mapped onto the declared label order.
#[cfg_attr(not(feature = "onnx"), allow(dead_code))]
pub(crate) fn label_from_logits(logits: &[f32]) -> Result<EmotionLabel, ClassifyError> {
    if logits.len() != EmotionLabel::COUNT {
        return Err(ClassifyError::UnexpectedOutput {
            expected: EmotionLabel::COUNT,
            got: logits.len(),
        });
    }
    let mut best = 0;
    for (i, v) in logits.iter().enumerate() {
        if *v > logits[best] {
            best = i;
        }
    }
    EmotionLabel::from_index(best).ok_or(ClassifyError::UnexpectedOutput {
        expected: EmotionLabel::COUNT,
        got: logits.len(),
    })
}

#[cfg(feature = "onnx")]
mod onnx {
    use super::{label_from_logits, ClassifyError, EmotionClassifier};
    use crate::emotion::EmotionLabel;
    use crate::preprocess::InputTensor;
    use ort::session::Session;
    use ort::value::Tensor;
    use std::path::Path;
    use tracing::{debug, error};

    /// The emotion CNN exported to ONNX, evaluated with ONNX Runtime.
    pub struct OnnxEmotionClassifier {
        session: Session,
    }

    impl OnnxEmotionClassifier {
        pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self, ClassifyError> {
            let path = model_path.as_ref();
            let load_err = |e: ort::Error| {
                error!(path = %path.display(), error = %e, "failed to load emotion model");
                ClassifyError::ModelLoad {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }
            };
            let session = Session::builder()
                .map_err(load_err)?
                .commit_from_file(path)
                .map_err(load_err)?;
            Ok(Self { session })
        }
    }

    impl EmotionClassifier for OnnxEmotionClassifier {
        fn classify(&mut self, tensor: &InputTensor) -> Result<EmotionLabel, ClassifyError> {
            let input = Tensor::from_array((tensor.shape, tensor.data.clone().into_boxed_slice()))
                .map_err(|e| ClassifyError::Inference(format!("failed to build input tensor: {e}")))?;

            let outputs = self
                .session
                .run(ort::inputs![input])
                .map_err(|e| ClassifyError::Inference(e.to_string()))?;

            let (_, value) = outputs
                .iter()
                .next()
                .ok_or_else(|| ClassifyError::Inference("model produced no outputs".to_owned()))?;
            let (_, logits) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| ClassifyError::Inference(format!("failed to extract logits: {e}")))?;

            let label = label_from_logits(logits)?;
            debug!(%label, "frame classified");
            Ok(label)
        }
    }
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxEmotionClassifier;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_maps_to_declared_order() {
        let logits = [0.1, -2.0, 0.3, 4.5, 1.0, 0.0, 2.2];
        assert_eq!(label_from_logits(&logits).unwrap(), EmotionLabel::Happiness);
    }

    #[test]
    fn argmax_ties_take_first_index() {
        let logits = [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        assert_eq!(label_from_logits(&logits).unwrap(), EmotionLabel::Anger);
    }

    #[test]
    fn wrong_output_width_is_rejected() {
        let err = label_from_logits(&[0.0; 8]).unwrap_err();
        assert!(matches!(
            err,
            ClassifyError::UnexpectedOutput { expected: 7, got: 8 }
        ));
    }
}
