use crate::emotion::EmotionLabel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Running per-label vote counts. Starts at zero for every label and is only
/// ever incremented.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    into = "BTreeMap<EmotionLabel, u64>",
    from = "BTreeMap<EmotionLabel, u64>"
)]
pub struct VoteTally {
    counts: [u64; EmotionLabel::COUNT],
}

impl VoteTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, label: EmotionLabel) {
        let slot = &mut self.counts[label.index()];
        *slot = slot.saturating_add(1);
    }

    pub fn count(&self, label: EmotionLabel) -> u64 {
        self.counts[label.index()]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Counts in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, u64)> + '_ {
        EmotionLabel::ALL.into_iter().map(move |l| (l, self.count(l)))
    }

    /// Label with the highest count. Equal counts resolve to the label declared
    /// first, so an empty tally yields [`EmotionLabel::Anger`].
    pub fn dominant(&self) -> EmotionLabel {
        let mut best = EmotionLabel::ALL[0];
        for (label, count) in self.iter() {
            if count > self.count(best) {
                best = label;
            }
        }
        best
    }
}

impl From<VoteTally> for BTreeMap<EmotionLabel, u64> {
    fn from(tally: VoteTally) -> Self {
        tally.iter().collect()
    }
}

impl From<BTreeMap<EmotionLabel, u64>> for VoteTally {
    fn from(map: BTreeMap<EmotionLabel, u64>) -> Self {
        let mut tally = VoteTally::new();
        for (label, count) in map {
            tally.counts[label.index()] = count;
        }
        tally
    }
}

/// Selects the dominant emotion and hands back the tally it was chosen from.
pub fn reduce(tally: VoteTally) -> (EmotionLabel, VoteTally) {
    (tally.dominant(), tally)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally_of(votes: &[(EmotionLabel, u64)]) -> VoteTally {
        let mut t = VoteTally::new();
        for &(label, n) in votes {
            for _ in 0..n {
                t.record(label);
            }
        }
        t
    }

    #[test]
    fn empty_tally_reduces_to_first_declared_label() {
        let (label, tally) = reduce(VoteTally::new());
        assert_eq!(label, EmotionLabel::Anger);
        assert!(tally.is_empty());
    }

    #[test]
    fn reduce_picks_strict_maximum() {
        let t = tally_of(&[
            (EmotionLabel::Happiness, 3),
            (EmotionLabel::Neutral, 2),
            (EmotionLabel::Anger, 1),
        ]);
        let (label, back) = reduce(t);
        assert_eq!(label, EmotionLabel::Happiness);
        assert_eq!(back, t);
    }

    #[test]
    fn ties_break_by_declaration_order() {
        let t = tally_of(&[(EmotionLabel::Surprise, 4), (EmotionLabel::Fear, 4)]);
        assert_eq!(t.dominant(), EmotionLabel::Fear);

        let t = tally_of(&[(EmotionLabel::Sadness, 2), (EmotionLabel::Neutral, 2)]);
        assert_eq!(t.dominant(), EmotionLabel::Neutral);
    }

    #[test]
    fn dominant_count_is_never_exceeded() {
        let t = tally_of(&[
            (EmotionLabel::Disgust, 5),
            (EmotionLabel::Sadness, 7),
            (EmotionLabel::Surprise, 7),
            (EmotionLabel::Anger, 6),
        ]);
        let best = t.dominant();
        assert_eq!(best, EmotionLabel::Sadness);
        for (_, count) in t.iter() {
            assert!(t.count(best) >= count);
        }
    }

    #[test]
    fn serializes_as_ordered_label_map() {
        let t = tally_of(&[(EmotionLabel::Happiness, 3), (EmotionLabel::Neutral, 2)]);
        let json = serde_json::to_string(&t).expect("serialize");
        assert_eq!(
            json,
            r#"{"anger":0,"disgust":0,"fear":0,"happiness":3,"neutral":2,"sadness":0,"surprise":0}"#
        );
        let back: VoteTally = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, t);
    }
}
