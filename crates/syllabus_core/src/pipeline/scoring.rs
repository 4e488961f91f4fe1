//! crates/syllabus_core/src/pipeline/scoring.rs
//!
//! Confidence scoring for candidate tasks.

/// Which extraction signals backed a candidate task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfidenceSignals {
    /// The document stated a due date that resolved to a calendar date.
    pub explicit_due_date: bool,
    /// The record kind was named directly rather than through an alias.
    pub recognized_kind: bool,
    /// The number or date token had a well-formed shape.
    pub recognized_format: bool,
}

pub trait ConfidenceScorer: Send + Sync {
    /// Returns a score in `[0, 1]`.
    fn score(&self, signals: &ConfidenceSignals) -> f64;
}

/// Additive weights over a base score. Monotone in every signal.
#[derive(Debug, Clone, Copy)]
pub struct WeightedConfidence {
    pub base: f64,
    pub due_date: f64,
    pub kind: f64,
    pub format: f64,
}

impl Default for WeightedConfidence {
    fn default() -> Self {
        Self {
            base: 0.2,
            due_date: 0.4,
            kind: 0.2,
            format: 0.2,
        }
    }
}

impl ConfidenceScorer for WeightedConfidence {
    fn score(&self, signals: &ConfidenceSignals) -> f64 {
        let mut score = self.base;
        if signals.explicit_due_date {
            score += self.due_date;
        }
        if signals.recognized_kind {
            score += self.kind;
        }
        if signals.recognized_format {
            score += self.format;
        }
        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_signals_give_full_confidence() {
        let signals = ConfidenceSignals {
            explicit_due_date: true,
            recognized_kind: true,
            recognized_format: true,
        };
        assert!((WeightedConfidence::default().score(&signals) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn explicit_due_date_never_scores_lower() {
        let scorer = WeightedConfidence::default();
        for kind in [false, true] {
            for format in [false, true] {
                let with = ConfidenceSignals {
                    explicit_due_date: true,
                    recognized_kind: kind,
                    recognized_format: format,
                };
                let without = ConfidenceSignals {
                    explicit_due_date: false,
                    ..with
                };
                assert!(scorer.score(&with) >= scorer.score(&without));
            }
        }
    }

    #[test]
    fn oversized_weights_are_clamped() {
        let scorer = WeightedConfidence {
            base: 0.9,
            due_date: 0.9,
            kind: 0.0,
            format: 0.0,
        };
        let score = scorer.score(&ConfidenceSignals {
            explicit_due_date: true,
            ..Default::default()
        });
        assert_eq!(score, 1.0);
    }
}
