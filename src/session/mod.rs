//! Cross-frame session state shared by every request handler.
//!
//! The stability window and the session history live behind one lock, so a
//! reader never sees one updated without the other.

pub mod export;
pub mod stability;
pub mod store;

use std::sync::Arc;

use log::info;
use parking_lot::Mutex;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::StabilityConfig;
use crate::models::FrameResult;
pub use export::{ExportInfo, SessionExport};
pub use stability::{Recommendation, StabilityReport, StabilityTracker};
pub use store::{Capture, SessionStats, SessionStore};

struct SessionState {
    id: Uuid,
    tracker: StabilityTracker,
    store: SessionStore,
}

/// Cheaply cloneable handle to one counting session.
#[derive(Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    pub fn new(config: StabilityConfig) -> Self {
        let state = SessionState {
            id: Uuid::new_v4(),
            tracker: StabilityTracker::new(config),
            store: SessionStore::new(OffsetDateTime::now_utc()),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.state.lock().id
    }

    /// Record a count from a successful analysis and report on the window.
    pub fn record_and_get_stability(&self, count: usize) -> StabilityReport {
        let mut state = self.state.lock();
        state.store.push_count(count);
        state.tracker.record(count);
        state.tracker.analyze()
    }

    /// Like [`Session::record_and_get_stability`], keeping the whole frame
    /// for export.
    pub fn record_frame(&self, frame: &FrameResult) -> StabilityReport {
        let mut state = self.state.lock();
        state.store.push_frame(frame);
        state.tracker.record(frame.count);
        let report = state.tracker.analyze();
        info!(
            "session {}: frame {} counted {} (mode {}, consistency {:.2})",
            state.id,
            state.store.len(),
            frame.count,
            report.most_frequent_count,
            report.consistency_score
        );
        report
    }

    pub fn stability(&self) -> StabilityReport {
        self.state.lock().tracker.analyze()
    }

    pub fn session_stats(&self) -> SessionStats {
        self.state.lock().store.stats(OffsetDateTime::now_utc())
    }

    /// Clear the history and the stability window in one step.
    pub fn reset_session(&self) {
        let mut state = self.state.lock();
        let previous = state.id;
        state.id = Uuid::new_v4();
        state.tracker.clear();
        state.store.reset(OffsetDateTime::now_utc());
        info!("session {previous} reset, now {}", state.id);
    }

    pub fn export_session(&self) -> SessionExport {
        let state = self.state.lock();
        let now = OffsetDateTime::now_utc();
        SessionExport {
            export_info: ExportInfo::new(state.id, now),
            session_data: state.store.stats(now),
            stability: state.tracker.analyze(),
            stability_window: state.tracker.counts().collect(),
            count_history: state.store.counts(),
            confidence_history: state.store.confidences(),
            frames: state.store.frames(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(StabilityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let session = Session::default();
        let other = session.clone();
        other.record_and_get_stability(4);
        assert_eq!(session.session_stats().total_images, 1);
        assert_eq!(session.id(), other.id());
    }

    #[test]
    fn reset_clears_window_and_history() {
        let session = Session::default();
        let before = session.id();
        for c in [5, 5, 5] {
            session.record_and_get_stability(c);
        }
        session.reset_session();

        assert_ne!(session.id(), before);
        assert_eq!(session.session_stats().total_images, 0);
        let report = session.stability();
        assert_eq!(report.most_frequent_count, 0);
        assert_eq!(report.consistency_score, 0.0);
    }

    #[test]
    fn history_outlives_window() {
        let session = Session::default();
        for c in 0..15 {
            session.record_and_get_stability(c);
        }
        let export = session.export_session();
        assert_eq!(export.count_history.len(), 15);
        assert_eq!(export.confidence_history.len(), 15);
        assert_eq!(export.frames.len(), 15);
        assert_eq!(export.session_data.total_images, 15);
        assert_eq!(export.session_data.max_count, 14);
        assert_eq!(export.stability_window, (5..15).collect::<Vec<_>>());
    }

    #[test]
    fn mixed_records_stay_aligned() {
        let session = Session::default();
        session.record_and_get_stability(4);
        session.record_frame(&FrameResult::build(OffsetDateTime::now_utc(), Vec::new(), 0.0));

        let export = session.export_session();
        assert_eq!(export.count_history, vec![4, 0]);
        assert_eq!(export.confidence_history, vec![None, Some(0.0)]);
        assert_eq!(export.frames.len(), 2);
        assert!(export.frames[0].is_none());
        assert_eq!(export.frames[1].as_ref().map(|f| f.count), Some(0));
    }
}
