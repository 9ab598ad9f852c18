use crate::config::{AnalysisConfig, TargetSampleRate};
use crate::emotion::{ClassifyError, EmotionClassifier, EmotionLabel};
use crate::face::{FaceError, FaceLocator};
use crate::frame::{BoundingBox, Frame};
use crate::overlay::Overlay;
use crate::preprocess::{FramePreprocessor, PreprocessConfig, PreprocessError};
use crate::sampler::{self, EmotionReport};
use crate::sink::{ResultSink, SinkError};
use crate::source::{FrameSource, SourceError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fatal conditions. Anything here means no result was produced.
#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    #[error("source unavailable ({selector}): {reason}")]
    SourceUnavailable { selector: String, reason: String },

    #[error("source read failed: {reason}")]
    SourceRead { reason: String },

    #[error("model load failed ({path}): {reason}")]
    ModelLoad { path: String, reason: String },

    #[error("image unreadable ({path}): {reason}")]
    Image { path: String, reason: String },

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl From<SourceError> for AnalysisError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Unavailable { selector, reason } => {
                Self::SourceUnavailable { selector, reason }
            }
            SourceError::Read(reason) => Self::SourceRead { reason },
        }
    }
}

impl From<FaceError> for AnalysisError {
    fn from(err: FaceError) -> Self {
        match err {
            FaceError::ModelLoad { path, reason } => Self::ModelLoad { path, reason },
            other => Self::Preprocess(PreprocessError::FaceLocator(other)),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PipelineConfig {
    pub target_rate: TargetSampleRate,
    pub preprocess: PreprocessConfig,
}

impl PipelineConfig {
    pub fn from_analysis(cfg: &AnalysisConfig) -> Self {
        Self {
            target_rate: cfg.target_rate,
            preprocess: PreprocessConfig {
                channel_order: cfg.channel_order,
                ..PreprocessConfig::default()
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImagePrediction {
    pub label: EmotionLabel,
    pub face: Option<BoundingBox>,
}

/// Face localisation, preprocessing and classification bundled for reuse
/// across runs.
pub struct EmotionPipeline<L, C> {
    preprocessor: FramePreprocessor<L>,
    classifier: C,
    target_rate: TargetSampleRate,
}

impl<L, C> EmotionPipeline<L, C>
where
    L: FaceLocator,
    C: EmotionClassifier,
{
    pub fn new(locator: L, classifier: C, config: PipelineConfig) -> Self {
        Self {
            preprocessor: FramePreprocessor::new(locator, config.preprocess),
            classifier,
            target_rate: config.target_rate,
        }
    }

    /// Samples `source` to termination and reduces the votes.
    pub fn analyze<S, O>(&mut self, source: S, overlay: Option<&mut O>) -> EmotionReport
    where
        S: FrameSource,
        O: Overlay + ?Sized,
    {
        let outcome = sampler::run(
            source,
            &mut self.preprocessor,
            &mut self.classifier,
            overlay,
            self.target_rate,
        );
        EmotionReport::from(outcome)
    }

    /// [`analyze`](Self::analyze), then hand the report to `sink`.
    pub fn analyze_into<S, O, K>(
        &mut self,
        source: S,
        overlay: Option<&mut O>,
        sink: &mut K,
    ) -> Result<EmotionReport, AnalysisError>
    where
        S: FrameSource,
        O: Overlay + ?Sized,
        K: ResultSink + ?Sized,
    {
        let report = self.analyze(source, overlay);
        sink.accept(&report)?;
        Ok(report)
    }

    /// Classifies one still image. Failures are errors here since there is
    /// no loop to absorb them.
    pub fn analyze_frame(&mut self, frame: &Frame) -> Result<ImagePrediction, AnalysisError> {
        let prepared = self.preprocessor.prepare(frame)?;
        let label = self.classifier.classify(&prepared.tensor)?;
        Ok(ImagePrediction {
            label,
            face: prepared.face,
        })
    }

    pub fn analyze_image<P: AsRef<Path>>(&mut self, path: P) -> Result<ImagePrediction, AnalysisError> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|e| AnalysisError::Image {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let prediction = self.analyze_frame(&Frame::new(0, image.to_rgb8()))?;
        tracing::info!(path = %path.display(), label = %prediction.label, face = prediction.face.is_some(), "image classified");
        Ok(prediction)
    }
}

#[cfg(feature = "onnx")]
mod onnx {
    use super::{AnalysisError, EmotionPipeline, PipelineConfig};
    use crate::config::AnalysisConfig;
    use crate::emotion::{ClassifyError, OnnxEmotionClassifier};
    use crate::face::{FaceLocator, NoFaceLocator, OnnxFaceLocator};

    pub type OnnxPipeline = EmotionPipeline<Box<dyn FaceLocator>, OnnxEmotionClassifier>;

    /// Loads the classifier and, if configured, the face detector.
    pub fn load_pipeline(cfg: &AnalysisConfig) -> Result<OnnxPipeline, AnalysisError> {
        let classifier = OnnxEmotionClassifier::load(&cfg.models.classifier).map_err(model_load)?;
        let locator: Box<dyn FaceLocator> = match cfg.models.face_detector.path_to_load() {
            Some(path) => Box::new(OnnxFaceLocator::load(path)?),
            None => {
                tracing::info!("no face model loaded, classifying whole frames");
                Box::new(NoFaceLocator::new())
            }
        };
        Ok(EmotionPipeline::new(
            locator,
            classifier,
            PipelineConfig::from_analysis(cfg),
        ))
    }

    fn model_load(err: ClassifyError) -> AnalysisError {
        match err {
            ClassifyError::ModelLoad { path, reason } => AnalysisError::ModelLoad { path, reason },
            other => AnalysisError::Classify(other),
        }
    }
}

#[cfg(feature = "onnx")]
pub use onnx::{load_pipeline, OnnxPipeline};

#[cfg(feature = "ffmpeg-sidecar")]
pub fn open_source(cfg: &AnalysisConfig) -> Result<crate::source::FfmpegFrameSource, AnalysisError> {
    Ok(crate::source::FfmpegFrameSource::open(&cfg.source)?)
}
