use crate::preprocess::ChannelOrder;
use crate::source::VideoSource;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_TARGET_SAMPLE_RATE: f64 = 5.0;
pub const DEFAULT_NATIVE_FRAME_RATE: f64 = 30.0;
pub const DEFAULT_CLASSIFIER_MODEL: &str = "emotion_cnn.onnx";
pub const DEFAULT_FACE_MODEL: &str = "face_detector.onnx";
pub const DEFAULT_PREVIEW_PATH: &str = "preview.png";
pub const ENV_CLASSIFIER_MODEL: &str = "EMOTION_CLASSIFIER_MODEL";
pub const ENV_FACE_MODEL: &str = "EMOTION_FACE_MODEL";
pub const ENV_TARGET_SAMPLE_RATE: &str = "EMOTION_TARGET_SAMPLE_RATE";

/// Classifications per second the loop aims for, independent of capture rate.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "f64", into = "f64")]
pub struct TargetSampleRate(f64);

impl TryFrom<f64> for TargetSampleRate {
    type Error = ConfigError;

    fn try_from(hz: f64) -> Result<Self, Self::Error> {
        Self::new(hz)
    }
}

impl From<TargetSampleRate> for f64 {
    fn from(rate: TargetSampleRate) -> Self {
        rate.0
    }
}

impl TargetSampleRate {
    pub fn new(hz: f64) -> Result<Self, ConfigError> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(ConfigError::InvalidSampleRate(hz.to_string()));
        }
        Ok(Self(hz))
    }

    pub fn hz(&self) -> f64 {
        self.0
    }
}

impl Default for TargetSampleRate {
    fn default() -> Self {
        Self(DEFAULT_TARGET_SAMPLE_RATE)
    }
}

/// Where the face detector comes from.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "path")]
pub enum FaceModel {
    /// Full-frame classification, no detector.
    Disabled,
    /// The built-in default location. A missing file falls back to
    /// full-frame classification.
    Default(PathBuf),
    /// Named on the command line or in the environment; must load.
    Explicit(PathBuf),
}

impl FaceModel {
    /// Path the detector should be loaded from, if any.
    pub fn path_to_load(&self) -> Option<&Path> {
        match self {
            Self::Disabled => None,
            Self::Explicit(path) => Some(path),
            Self::Default(path) if path.is_file() => Some(path),
            Self::Default(path) => {
                warn!(
                    path = %path.display(),
                    "default face model not found, classifying whole frames"
                );
                None
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelPaths {
    pub classifier: PathBuf,
    pub face_detector: FaceModel,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            classifier: PathBuf::from(DEFAULT_CLASSIFIER_MODEL),
            face_detector: FaceModel::Default(PathBuf::from(DEFAULT_FACE_MODEL)),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OverlayConfig {
    pub enabled: bool,
    pub preview_path: Option<PathBuf>,
}

impl OverlayConfig {
    pub fn preview_path(&self) -> PathBuf {
        self.preview_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PREVIEW_PATH))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    pub source: VideoSource,
    pub target_rate: TargetSampleRate,
    pub overlay: OverlayConfig,
    pub models: ModelPaths,
    pub channel_order: ChannelOrder,
}

impl AnalysisConfig {
    pub fn new(source: VideoSource) -> Self {
        Self {
            source,
            target_rate: TargetSampleRate::default(),
            overlay: OverlayConfig::default(),
            models: ModelPaths::default(),
            channel_order: ChannelOrder::default(),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("target sample rate must be a positive number, got {0}")]
    InvalidSampleRate(String),
    #[error("model path must not be empty")]
    EmptyModelPath,
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_model_path(
    cli_value: Option<PathBuf>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> Result<PathBuf, ConfigError> {
    let path = match cli_value {
        Some(p) => p,
        None => PathBuf::from(resolve_string_with_default(None, env_key, env, default)),
    };
    if path.as_os_str().is_empty() {
        return Err(ConfigError::EmptyModelPath);
    }
    Ok(path)
}

/// CLI path > `EMOTION_FACE_MODEL` > built-in default; `disabled` wins over all.
pub fn resolve_face_model(
    cli_value: Option<PathBuf>,
    disabled: bool,
    env: &impl Env,
) -> Result<FaceModel, ConfigError> {
    if disabled {
        return Ok(FaceModel::Disabled);
    }
    let explicit = cli_value.or_else(|| env.var(ENV_FACE_MODEL).map(PathBuf::from));
    match explicit {
        Some(path) if path.as_os_str().is_empty() => Err(ConfigError::EmptyModelPath),
        Some(path) => Ok(FaceModel::Explicit(path)),
        None => Ok(FaceModel::Default(PathBuf::from(DEFAULT_FACE_MODEL))),
    }
}

pub fn resolve_sample_rate(
    cli_value: Option<f64>,
    env: &impl Env,
) -> Result<TargetSampleRate, ConfigError> {
    match cli_value {
        Some(hz) => TargetSampleRate::new(hz),
        None => match env.var(ENV_TARGET_SAMPLE_RATE) {
            Some(raw) => {
                let hz = raw
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| ConfigError::InvalidSampleRate(raw.clone()))?;
                TargetSampleRate::new(hz)
            }
            None => Ok(TargetSampleRate::default()),
        },
    }
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}
