mod classifier;
mod tally;

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[cfg(feature = "onnx")]
pub use classifier::OnnxEmotionClassifier;
pub use classifier::{ClassifyError, EmotionClassifier};
pub use tally::{reduce, VoteTally};

/// The closed set of labels the classifier can emit, in declaration order.
///
/// Declaration order doubles as the tie-break order when reducing a tally and
/// as the index order of the classifier's output logits.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Anger,
    Disgust,
    Fear,
    Happiness,
    Neutral,
    Sadness,
    Surprise,
}

impl EmotionLabel {
    pub const ALL: [EmotionLabel; 7] = [
        EmotionLabel::Anger,
        EmotionLabel::Disgust,
        EmotionLabel::Fear,
        EmotionLabel::Happiness,
        EmotionLabel::Neutral,
        EmotionLabel::Sadness,
        EmotionLabel::Surprise,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EmotionLabel::Anger => "anger",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Happiness => "happiness",
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Sadness => "sadness",
            EmotionLabel::Surprise => "surprise",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown emotion label: {0}")]
pub struct UnknownLabel(pub String);

impl FromStr for EmotionLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownLabel(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaration_order_matches_index() {
        for (i, label) in EmotionLabel::ALL.iter().enumerate() {
            assert_eq!(label.index(), i);
            assert_eq!(EmotionLabel::from_index(i), Some(*label));
        }
        assert_eq!(EmotionLabel::from_index(EmotionLabel::COUNT), None);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Happiness".parse::<EmotionLabel>(), Ok(EmotionLabel::Happiness));
        assert_eq!(" fear ".parse::<EmotionLabel>(), Ok(EmotionLabel::Fear));
        assert!("contempt".parse::<EmotionLabel>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        let s = serde_json::to_string(&EmotionLabel::Surprise).expect("serialize");
        assert_eq!(s, "\"surprise\"");
    }
}
