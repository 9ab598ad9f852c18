//! The sampling and aggregation loop.
//!
//! Reads frames from a [`FrameSource`], classifies every `interval`-th one,
//! and accumulates a [`VoteTally`] until the source is exhausted (files) or a
//! cancellation is observed (live devices with an overlay).


use crate::config::TargetSampleRate;
use crate::emotion::{reduce, EmotionClassifier, EmotionLabel, VoteTally};
use crate::face::FaceLocator;
use crate::overlay::Overlay;
use crate::preprocess::FramePreprocessor;
use crate::source::{FrameSource, SourceKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Consecutive live read misses before the first warning.
const MISS_WARN_FROM: u64 = 64;

/// Native frames per classification attempt. Always at least 1.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "u64", into = "u64")]
pub struct SampleInterval(u64);

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("sample interval must be at least 1")]
pub struct ZeroInterval;

impl TryFrom<u64> for SampleInterval {
    type Error = ZeroInterval;

    fn try_from(frames: u64) -> Result<Self, Self::Error> {
        if frames == 0 {
            return Err(ZeroInterval);
        }
        Ok(Self(frames))
    }
}

impl From<SampleInterval> for u64 {
    fn from(interval: SampleInterval) -> Self {
        interval.0
    }
}

impl SampleInterval {
    /// `max(floor(native / target), 1)`; degenerate inputs collapse to 1.
    pub fn derive(native_rate: f64, target_rate: f64) -> Self {
        let ratio = (native_rate / target_rate).floor();
        if ratio.is_finite() && ratio >= 1.0 {
            // Saturating float-to-int conversion.
            Self(ratio as u64)
        } else {
            Self(1)
        }
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn is_due(self, frame_index: u64) -> bool {
        frame_index % self.0 == 0
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    SourceExhausted,
    UserCancelled,
}

/// Everything the loop accumulated, before reduction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopOutcome {
    pub tally: VoteTally,
    pub termination: Termination,
    pub interval: SampleInterval,
    pub frames_read: u64,
    pub attempts: u64,
    pub skipped: u64,
}

/// Final, reduced result of one analysis run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmotionReport {
    pub label: EmotionLabel,
    pub tally: VoteTally,
    pub termination: Termination,
    pub sample_interval: u64,
    pub frames_read: u64,
    pub attempts: u64,
    pub skipped: u64,
}

impl From<LoopOutcome> for EmotionReport {
    fn from(outcome: LoopOutcome) -> Self {
        let (label, tally) = reduce(outcome.tally);
        Self {
            label,
            tally,
            termination: outcome.termination,
            sample_interval: outcome.interval.get(),
            frames_read: outcome.frames_read,
            attempts: outcome.attempts,
            skipped: outcome.skipped,
        }
    }
}

/// Runs the loop to termination.
///
/// `source` is consumed and dropped before returning, which releases the
/// device or file on every exit path. Per-frame preprocessing, classification
/// and overlay failures are logged and skipped.
pub fn run<S, L, C, O>(
    source: S,
    preprocessor: &mut FramePreprocessor<L>,
    classifier: &mut C,
    mut overlay: Option<&mut O>,
    target_rate: TargetSampleRate,
) -> LoopOutcome
where
    S: FrameSource,
    L: FaceLocator,
    C: EmotionClassifier,
    O: Overlay + ?Sized,
{
    let mut source = source;
    let kind = source.kind();
    let native_rate = source.native_frame_rate();
    let interval = SampleInterval::derive(native_rate, target_rate.hz());
    let cancellable = kind == SourceKind::Unbounded && overlay.is_some();

    info!(
        ?kind,
        native_rate,
        target_rate = target_rate.hz(),
        interval = interval.get(),
        overlay = overlay.is_some(),
        "sampling started"
    );

    let mut tally = VoteTally::new();
    let mut frame_index: u64 = 0;
    let mut attempts: u64 = 0;
    let mut skipped: u64 = 0;
    let mut misses: u64 = 0;

    let termination = loop {
        let read = source.next_frame();
        let frame = match (read, kind) {
            (Ok(Some(frame)), _) => {
                misses = 0;
                frame
            }
            (Ok(None), SourceKind::Finite) => break Termination::SourceExhausted,
            (Err(e), SourceKind::Finite) => {
                warn!(error = %e, frame_index, "read failed on finite source, treating as end of stream");
                break Termination::SourceExhausted;
            }
            (miss, SourceKind::Unbounded) => {
                misses += 1;
                if let Err(e) = miss {
                    debug!(error = %e, misses, "live read failed, retrying");
                } else {
                    debug!(misses, "live source delivered no frame, retrying");
                }
                if miss_warrants_warning(misses) {
                    warn!(misses, "live source keeps failing to deliver frames");
                }
                if cancellable && overlay.as_deref().is_some_and(|o| o.cancel_requested()) {
                    break Termination::UserCancelled;
                }
                continue;
            }
        };

        let index = frame_index;
        frame_index += 1;

        if interval.is_due(index) {
            attempts += 1;
            let (face, label) = match preprocessor.prepare(&frame) {
                Ok(prepared) => match classifier.classify(&prepared.tensor) {
                    Ok(label) => {
                        tally.record(label);
                        debug!(frame_index = index, %label, "vote recorded");
                        (prepared.face, Some(label))
                    }
                    Err(e) => {
                        skipped += 1;
                        warn!(frame_index = index, error = %e, "classification failed, skipping frame");
                        (prepared.face, None)
                    }
                },
                Err(e) => {
                    skipped += 1;
                    warn!(frame_index = index, error = %e, "preprocessing failed, skipping frame");
                    (None, None)
                }
            };

            if let Some(o) = overlay.as_deref_mut() {
                if let Err(e) = o.present(&frame, face, label) {
                    warn!(frame_index = index, error = %e, "overlay present failed");
                }
            }
        }

        if cancellable && overlay.as_deref().is_some_and(|o| o.cancel_requested()) {
            break Termination::UserCancelled;
        }
    };

    drop(source);

    info!(
        ?termination,
        frames_read = frame_index,
        attempts,
        skipped,
        votes = tally.total(),
        "sampling finished"
    );

    LoopOutcome {
        tally,
        termination,
        interval,
        frames_read: frame_index,
        attempts,
        skipped,
    }
}

/// Warn at 64 consecutive misses, then each time the streak doubles, so a
/// dead device logs a handful of lines instead of one per spin.
fn miss_warrants_warning(misses: u64) -> bool {
    misses >= MISS_WARN_FROM && misses.is_power_of_two()
}
