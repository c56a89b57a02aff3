use std::collections::{HashMap, VecDeque};
use std::fmt;

use serde::Serialize;

use crate::config::StabilityConfig;

/// What the operator should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Counts agree; the mode can be trusted.
    Stable,
    /// Counts are settling; take a few more captures.
    CaptureMore,
    /// Counts disagree; vibrate the tray to separate parts, then recapture.
    Vibrate,
}

impl Recommendation {
    pub fn message(&self) -> &'static str {
        match self {
            Recommendation::Stable => "Count is stable across recent captures.",
            Recommendation::CaptureMore => "Take more images after vibrating the plate.",
            Recommendation::Vibrate => "Counts disagree. Vibrate the plate to separate parts.",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StabilityReport {
    pub most_frequent_count: usize,
    pub consistency_score: f32,
    pub recommendation: Recommendation,
}

/// Rolling window over the most recent per-frame counts.
#[derive(Debug, Clone)]
pub struct StabilityTracker {
    window: VecDeque<usize>,
    config: StabilityConfig,
}

impl StabilityTracker {
    pub fn new(config: StabilityConfig) -> Self {
        let capacity = config.window_capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            config,
        }
    }

    pub fn capacity(&self) -> usize {
        self.config.window_capacity.max(1)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Counts in the window, oldest first.
    pub fn counts(&self) -> impl Iterator<Item = usize> + '_ {
        self.window.iter().copied()
    }

    pub fn record(&mut self, count: usize) {
        if self.window.len() == self.capacity() {
            self.window.pop_front();
        }
        self.window.push_back(count);
    }

    pub fn analyze(&self) -> StabilityReport {
        if self.window.is_empty() {
            return StabilityReport {
                most_frequent_count: 0,
                consistency_score: 0.0,
                recommendation: self.recommend(0.0),
            };
        }

        let mut frequency: HashMap<usize, usize> = HashMap::new();
        for count in &self.window {
            *frequency.entry(*count).or_insert(0) += 1;
        }
        let top = frequency.values().copied().max().unwrap_or(0);

        // Ties go to whichever tied value was seen most recently.
        let mode = self
            .window
            .iter()
            .rev()
            .copied()
            .find(|c| frequency.get(c) == Some(&top))
            .unwrap_or(0);

        let consistency_score = top as f32 / self.window.len() as f32;
        StabilityReport {
            most_frequent_count: mode,
            consistency_score,
            recommendation: self.recommend(consistency_score),
        }
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }

    fn recommend(&self, score: f32) -> Recommendation {
        if self.window.len() < self.config.min_samples {
            Recommendation::CaptureMore
        } else if score >= self.config.stable_cutoff {
            Recommendation::Stable
        } else if score >= self.config.settling_cutoff {
            Recommendation::CaptureMore
        } else {
            Recommendation::Vibrate
        }
    }
}

impl Default for StabilityTracker {
    fn default() -> Self {
        Self::new(StabilityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_with(counts: &[usize]) -> StabilityTracker {
        let mut tracker = StabilityTracker::default();
        for c in counts {
            tracker.record(*c);
        }
        tracker
    }

    #[test]
    fn window_never_exceeds_capacity() {
        let tracker = tracker_with(&(0..25).collect::<Vec<_>>());
        assert_eq!(tracker.len(), 10);
        assert_eq!(tracker.counts().next(), Some(15));
    }

    #[test]
    fn mode_and_score() {
        let report = tracker_with(&[4, 4, 5, 4, 3]).analyze();
        assert_eq!(report.most_frequent_count, 4);
        assert!((report.consistency_score - 0.6).abs() < 1e-6);
        assert_eq!(report.recommendation, Recommendation::CaptureMore);
    }

    #[test]
    fn tie_goes_to_most_recent_value() {
        assert_eq!(tracker_with(&[3, 3, 7, 7]).analyze().most_frequent_count, 7);
        assert_eq!(tracker_with(&[7, 3, 7, 3]).analyze().most_frequent_count, 3);
    }

    #[test]
    fn empty_window_reports_zero() {
        let report = StabilityTracker::default().analyze();
        assert_eq!(report.most_frequent_count, 0);
        assert_eq!(report.consistency_score, 0.0);
        assert_eq!(report.recommendation, Recommendation::CaptureMore);
    }

    #[test]
    fn recommendation_cut_points() {
        assert_eq!(tracker_with(&[5; 5]).analyze().recommendation, Recommendation::Stable);
        assert_eq!(
            tracker_with(&[5, 5, 5, 5, 6]).analyze().recommendation,
            Recommendation::Stable
        );
        assert_eq!(
            tracker_with(&[1, 2, 3, 4]).analyze().recommendation,
            Recommendation::Vibrate
        );
    }

    #[test]
    fn single_capture_asks_for_more() {
        let report = tracker_with(&[6]).analyze();
        assert_eq!(report.most_frequent_count, 6);
        assert_eq!(report.consistency_score, 1.0);
        assert_eq!(report.recommendation, Recommendation::CaptureMore);
    }

    #[test]
    fn score_stays_in_unit_interval() {
        let mut tracker = StabilityTracker::default();
        for i in 0..40usize {
            tracker.record(i * 7 % 5);
            let score = tracker.analyze().consistency_score;
            assert!(score > 0.0 && score <= 1.0);
        }
    }

    #[test]
    fn clear_empties_window() {
        let mut tracker = tracker_with(&[2, 2, 2]);
        tracker.clear();
        assert!(tracker.is_empty());
        assert_eq!(tracker.analyze().most_frequent_count, 0);
    }
}
