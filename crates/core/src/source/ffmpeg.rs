use crate::frame::Frame;
use crate::source::{FrameSource, SourceError, SourceKind, VideoSource};
use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::download;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use ffmpeg_sidecar::iter::FfmpegIterator;
use image::RgbImage;
use tracing::{debug, info, warn};

/// Frames decoded to RGB24 by an `ffmpeg` child process.
///
/// The child is killed and reaped when the source is dropped.
pub struct FfmpegFrameSource {
    selector: String,
    kind: SourceKind,
    frame_rate: Option<f64>,
    child: FfmpegChild,
    events: FfmpegIterator,
    sequence: u64,
    finished: bool,
}

impl FfmpegFrameSource {
    pub fn open(source: &VideoSource) -> Result<Self, SourceError> {
        let selector = source.to_string();
        let unavailable = |reason: String| SourceError::Unavailable {
            selector: selector.clone(),
            reason,
        };

        if let VideoSource::File(path) = source {
            if !path.exists() {
                return Err(unavailable("file not found".to_owned()));
            }
            if !path.is_file() {
                return Err(unavailable("not a regular file".to_owned()));
            }
        }

        download::auto_download().map_err(|e| unavailable(format!("ffmpeg unavailable: {e}")))?;

        let input_args = input_args(source).map_err(unavailable)?;
        let mut child = FfmpegCommand::new()
            .hide_banner()
            .args(["-nostdin", "-loglevel", "error"])
            .args(input_args)
            .rawvideo()
            .spawn()
            .map_err(|e| unavailable(format!("failed to spawn ffmpeg: {e}")))?;

        let mut events = match child.iter() {
            Ok(events) => events,
            Err(e) => {
                reap(&mut child);
                return Err(unavailable(format!("ffmpeg output unavailable: {e}")));
            }
        };

        let metadata = match events.collect_metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                reap(&mut child);
                return Err(unavailable(e.to_string()));
            }
        };

        let frame_rate = metadata
            .input_streams
            .iter()
            .find_map(|s| s.video_data())
            .map(|v| f64::from(v.fps));

        info!(source = %selector, kind = ?source.kind(), ?frame_rate, "video source opened");

        Ok(Self {
            selector,
            kind: source.kind(),
            frame_rate,
            child,
            events,
            sequence: 0,
            finished: false,
        })
    }
}

impl FrameSource for FfmpegFrameSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn reported_frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.finished {
            return Ok(None);
        }

        for event in self.events.by_ref() {
            match event {
                FfmpegEvent::OutputFrame(out) => {
                    let image = RgbImage::from_raw(out.width, out.height, out.data).ok_or_else(|| {
                        SourceError::Read(format!(
                            "frame buffer does not match {}x{} rgb24",
                            out.width, out.height
                        ))
                    })?;
                    let frame = Frame::new(self.sequence, image);
                    self.sequence += 1;
                    return Ok(Some(frame));
                }
                FfmpegEvent::Error(e) | FfmpegEvent::Log(LogLevel::Error, e) => {
                    warn!(source = %self.selector, error = %e, "ffmpeg reported an error");
                }
                FfmpegEvent::Done => break,
                _ => {}
            }
        }

        self.finished = true;
        debug!(source = %self.selector, frames = self.sequence, "ffmpeg output ended");
        match self.kind {
            SourceKind::Finite => Ok(None),
            SourceKind::Unbounded => Err(SourceError::Read("capture process exited".to_owned())),
        }
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        reap(&mut self.child);
        debug!(source = %self.selector, "video source released");
    }
}

fn reap(child: &mut FfmpegChild) {
    if let Err(e) = child.kill() {
        debug!(error = %e, "ffmpeg already exited");
    }
    if let Err(e) = child.wait() {
        warn!(error = %e, "failed to reap ffmpeg");
    }
}

/// ffmpeg arguments selecting `source` as the input.
fn input_args(source: &VideoSource) -> Result<Vec<String>, String> {
    let owned = |args: &[&str]| args.iter().map(|s| (*s).to_owned()).collect::<Vec<_>>();
    match source {
        VideoSource::File(path) => Ok(vec!["-i".to_owned(), path.display().to_string()]),
        VideoSource::Camera(index) => {
            let mut args = owned(&["-fflags", "nobuffer", "-flags", "low_delay"]);
            if cfg!(target_os = "linux") {
                args.extend(owned(&["-f", "v4l2", "-i"]));
                args.push(format!("/dev/video{index}"));
            } else if cfg!(target_os = "macos") {
                args.extend(owned(&["-f", "avfoundation", "-framerate", "30", "-i"]));
                args.push(format!("{index}:none"));
            } else {
                return Err("camera capture by index is not supported on this platform".to_owned());
            }
            Ok(args)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn file_input_args() {
        let args = input_args(&VideoSource::File(PathBuf::from("clip.mp4"))).unwrap();
        assert_eq!(args, vec!["-i", "clip.mp4"]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn camera_input_uses_v4l2() {
        let args = input_args(&VideoSource::Camera(1)).unwrap();
        assert_eq!(args.last().map(String::as_str), Some("/dev/video1"));
        assert!(args.windows(2).any(|w| w == ["-f", "v4l2"]));
    }

    #[test]
    fn missing_file_is_unavailable() {
        let src = VideoSource::File(PathBuf::from("/definitely/not/here.mp4"));
        let err = FfmpegFrameSource::open(&src).err().expect("open must fail");
        assert!(matches!(err, SourceError::Unavailable { .. }));
        assert!(err.to_string().contains("not/here.mp4"));
    }

    #[test]
    #[ignore]
    fn ffmpeg_decode_smoke_ignored() {
        // Needs ffmpeg and a short clip named by EMOTION_SAMPLE_CLIP.
        let Ok(clip) = std::env::var("EMOTION_SAMPLE_CLIP") else {
            return;
        };
        let mut src = FfmpegFrameSource::open(&VideoSource::File(PathBuf::from(clip))).unwrap();
        assert_eq!(src.kind(), SourceKind::Finite);
        assert!(src.native_frame_rate() > 0.0);

        let mut frames = 0u64;
        while let Some(frame) = src.next_frame().unwrap() {
            assert_eq!(frame.sequence, frames);
            frames += 1;
        }
        assert!(frames > 0);
        assert!(src.next_frame().unwrap().is_none());
    }
}
