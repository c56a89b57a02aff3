use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::models::FrameResult;

/// Aggregate view over everything recorded since the last reset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStats {
    pub total_images: usize,
    #[serde(serialize_with = "crate::models::serialize_rfc3339")]
    pub started_at: OffsetDateTime,
    pub session_duration_seconds: f64,
    pub average_count: f64,
    pub min_count: usize,
    pub max_count: usize,
}

impl SessionStats {
    pub fn session_duration_minutes(&self) -> f64 {
        self.session_duration_seconds / 60.0
    }
}

/// One recorded capture. Bare counts carry no confidence or frame.
#[derive(Debug, Clone)]
pub struct Capture {
    pub count: usize,
    pub mean_confidence: Option<f32>,
    pub frame: Option<FrameResult>,
}

/// Full history of one counting session, one entry per capture.
#[derive(Debug, Clone)]
pub struct SessionStore {
    started_at: OffsetDateTime,
    captures: Vec<Capture>,
}

impl SessionStore {
    pub fn new(started_at: OffsetDateTime) -> Self {
        Self {
            started_at,
            captures: Vec::new(),
        }
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    /// Record a bare count, for callers that keep frames elsewhere.
    pub fn push_count(&mut self, count: usize) {
        self.captures.push(Capture {
            count,
            mean_confidence: None,
            frame: None,
        });
    }

    pub fn push_frame(&mut self, frame: &FrameResult) {
        self.captures.push(Capture {
            count: frame.count,
            mean_confidence: Some(frame.mean_confidence),
            frame: Some(frame.clone()),
        });
    }

    pub fn len(&self) -> usize {
        self.captures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }

    pub fn captures(&self) -> &[Capture] {
        &self.captures
    }

    pub fn counts(&self) -> Vec<usize> {
        self.captures.iter().map(|c| c.count).collect()
    }

    pub fn confidences(&self) -> Vec<Option<f32>> {
        self.captures.iter().map(|c| c.mean_confidence).collect()
    }

    pub fn frames(&self) -> Vec<Option<FrameResult>> {
        self.captures.iter().map(|c| c.frame.clone()).collect()
    }

    pub fn stats(&self, now: OffsetDateTime) -> SessionStats {
        let elapsed: Duration = now - self.started_at;
        let session_duration_seconds = elapsed.as_seconds_f64().max(0.0);

        let counts = self.captures.iter().map(|c| c.count);
        let (average_count, min_count, max_count) = if self.captures.is_empty() {
            (0.0, 0, 0)
        } else {
            let sum: usize = counts.clone().sum();
            (
                sum as f64 / self.captures.len() as f64,
                counts.clone().min().unwrap_or(0),
                counts.max().unwrap_or(0),
            )
        };

        SessionStats {
            total_images: self.captures.len(),
            started_at: self.started_at,
            session_duration_seconds,
            average_count,
            min_count,
            max_count,
        }
    }

    /// Drop all history and restart the session clock at `now`.
    pub fn reset(&mut self, now: OffsetDateTime) {
        self.captures.clear();
        self.started_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_reports_zeroes() {
        let start = OffsetDateTime::UNIX_EPOCH;
        let stats = SessionStore::new(start).stats(start + Duration::minutes(3));
        assert_eq!(stats.total_images, 0);
        assert_eq!(stats.average_count, 0.0);
        assert_eq!((stats.min_count, stats.max_count), (0, 0));
        assert!((stats.session_duration_minutes() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn stats_over_counts() {
        let start = OffsetDateTime::UNIX_EPOCH;
        let mut store = SessionStore::new(start);
        for c in [4, 6, 5] {
            store.push_count(c);
        }
        let stats = store.stats(start + Duration::seconds(30));
        assert_eq!(stats.total_images, 3);
        assert!((stats.average_count - 5.0).abs() < 1e-9);
        assert_eq!((stats.min_count, stats.max_count), (4, 6));
        assert!((stats.session_duration_seconds - 30.0).abs() < 1e-9);
    }

    #[test]
    fn histories_stay_aligned_per_capture() {
        let start = OffsetDateTime::UNIX_EPOCH;
        let mut store = SessionStore::new(start);
        store.push_count(4);
        store.push_frame(&FrameResult::build(start, Vec::new(), 0.0));
        store.push_count(6);

        assert_eq!(store.counts(), vec![4, 0, 6]);
        assert_eq!(store.confidences(), vec![None, Some(0.0), None]);
        let frames = store.frames();
        assert_eq!(frames.len(), 3);
        assert!(frames[0].is_none() && frames[1].is_some() && frames[2].is_none());
    }

    #[test]
    fn reset_restarts_clock() {
        let start = OffsetDateTime::UNIX_EPOCH;
        let mut store = SessionStore::new(start);
        store.push_count(3);
        let later = start + Duration::hours(1);
        store.reset(later);
        assert!(store.is_empty());
        assert_eq!(store.started_at(), later);
        assert_eq!(store.stats(later).session_duration_seconds, 0.0);
    }
}
