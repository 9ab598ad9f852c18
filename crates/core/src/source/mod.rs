#[cfg(feature = "ffmpeg-sidecar")]
mod ffmpeg;

use crate::config::DEFAULT_NATIVE_FRAME_RATE;
use crate::frame::Frame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[cfg(feature = "ffmpeg-sidecar")]
pub use ffmpeg::FfmpegFrameSource;

/// Where frames come from: a live capture device by index, or a video file.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum VideoSource {
    Camera(u32),
    File(PathBuf),
}

impl VideoSource {
    /// An all-digit selector is a camera index; anything else is a path.
    pub fn parse(selector: &str) -> Self {
        let s = selector.trim();
        match s.parse::<u32>() {
            Ok(index) if s.bytes().all(|b| b.is_ascii_digit()) => Self::Camera(index),
            _ => Self::File(PathBuf::from(selector)),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Camera(_) => SourceKind::Unbounded,
            Self::File(_) => SourceKind::Finite,
        }
    }
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Camera(index) => write!(f, "camera {index}"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Decided once when the source is opened.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    /// File-backed; exhaustion ends the loop.
    Finite,
    /// Live device; only cancellation ends the loop.
    Unbounded,
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("source unavailable ({selector}): {reason}")]
    Unavailable { selector: String, reason: String },

    #[error("frame read failed: {0}")]
    Read(String),
}

/// An opened video source.
///
/// Dropping the value releases the underlying device or file.
pub trait FrameSource {
    fn kind(&self) -> SourceKind;

    /// Rate reported by the source, if any.
    fn reported_frame_rate(&self) -> Option<f64>;

    /// `Ok(None)` means no frame was delivered. For a finite source that is
    /// end of stream; for a live source it is a transient miss.
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    fn native_frame_rate(&self) -> f64 {
        sanitize_frame_rate(self.reported_frame_rate())
    }
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn kind(&self) -> SourceKind {
        (**self).kind()
    }

    fn reported_frame_rate(&self) -> Option<f64> {
        (**self).reported_frame_rate()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        (**self).next_frame()
    }
}

/// Missing, zero, negative or non-finite rates become the 30 fps default.
pub fn sanitize_frame_rate(reported: Option<f64>) -> f64 {
    match reported {
        Some(r) if r.is_finite() && r > 0.0 => r,
        _ => DEFAULT_NATIVE_FRAME_RATE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_select_camera() {
        assert_eq!(VideoSource::parse("0"), VideoSource::Camera(0));
        assert_eq!(VideoSource::parse(" 2 "), VideoSource::Camera(2));
        assert_eq!(VideoSource::parse("0").kind(), SourceKind::Unbounded);
    }

    #[test]
    fn anything_else_is_a_file() {
        assert_eq!(
            VideoSource::parse("clip.mp4"),
            VideoSource::File(PathBuf::from("clip.mp4"))
        );
        assert_eq!(
            VideoSource::parse("+1"),
            VideoSource::File(PathBuf::from("+1"))
        );
        assert_eq!(VideoSource::parse("-1").kind(), SourceKind::Finite);
    }

    #[test]
    fn frame_rate_defaults() {
        assert_eq!(sanitize_frame_rate(None), 30.0);
        assert_eq!(sanitize_frame_rate(Some(0.0)), 30.0);
        assert_eq!(sanitize_frame_rate(Some(-24.0)), 30.0);
        assert_eq!(sanitize_frame_rate(Some(f64::NAN)), 30.0);
        assert_eq!(sanitize_frame_rate(Some(25.0)), 25.0);
    }
}
