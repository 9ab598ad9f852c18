use crate::sampler::EmotionReport;
use tracing::info;

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("result sink failed: {0}")]
    Failed(String),
}

/// Receives the reduced result of a run, e.g. to update a shared state
/// record's emotion field.
pub trait ResultSink {
    fn accept(&mut self, report: &EmotionReport) -> Result<(), SinkError>;
}

impl<T: ResultSink + ?Sized> ResultSink for &mut T {
    fn accept(&mut self, report: &EmotionReport) -> Result<(), SinkError> {
        (**self).accept(report)
    }
}

/// Adapts a closure into a [`ResultSink`].
pub struct FnSink<F>(pub F);

impl<F> ResultSink for FnSink<F>
where
    F: FnMut(&EmotionReport) -> Result<(), SinkError>,
{
    fn accept(&mut self, report: &EmotionReport) -> Result<(), SinkError> {
        (self.0)(report)
    }
}

#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl ResultSink for LogSink {
    fn accept(&mut self, report: &EmotionReport) -> Result<(), SinkError> {
        let tally = serde_json::to_string(&report.tally).map_err(|e| SinkError::Failed(e.to_string()))?;
        info!(
            label = %report.label,
            termination = ?report.termination,
            attempts = report.attempts,
            skipped = report.skipped,
            %tally,
            "dominant emotion"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::{EmotionLabel, VoteTally};
    use crate::sampler::Termination;

    fn report() -> EmotionReport {
        let mut tally = VoteTally::new();
        tally.record(EmotionLabel::Surprise);
        EmotionReport {
            label: EmotionLabel::Surprise,
            tally,
            termination: Termination::SourceExhausted,
            sample_interval: 6,
            frames_read: 6,
            attempts: 1,
            skipped: 0,
        }
    }

    #[test]
    fn fn_sink_sees_report() {
        let mut seen = None;
        {
            let mut sink = FnSink(|r: &EmotionReport| {
                seen = Some(r.label);
                Ok(())
            });
            sink.accept(&report()).expect("accept");
        }
        assert_eq!(seen, Some(EmotionLabel::Surprise));
    }

    #[test]
    fn log_sink_accepts() {
        LogSink.accept(&report()).expect("accept");
    }

    #[test]
    fn report_json_shape() {
        let v = serde_json::to_value(report()).expect("serialize");
        assert_eq!(v["label"], "surprise");
        assert_eq!(v["termination"], "source_exhausted");
        assert_eq!(v["tally"]["surprise"], 1);
        assert_eq!(v["tally"]["anger"], 0);
    }
}
