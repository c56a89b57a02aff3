use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use super::stability::StabilityReport;
use super::store::SessionStats;
use crate::error::Result;
use crate::models::FrameResult;

#[derive(Debug, Clone, Serialize)]
pub struct ExportInfo {
    pub session_id: Uuid,
    #[serde(serialize_with = "crate::models::serialize_rfc3339")]
    pub exported_at: OffsetDateTime,
    pub system: &'static str,
    pub version: &'static str,
}

/// Serializable snapshot of a session, taken under the session lock.
///
/// The three histories have one entry per capture; captures recorded as a
/// bare count have `null` confidence and frame.
#[derive(Debug, Clone, Serialize)]
pub struct SessionExport {
    pub export_info: ExportInfo,
    pub session_data: SessionStats,
    pub stability: StabilityReport,
    /// Counts currently in the stability window, oldest first.
    pub stability_window: Vec<usize>,
    pub count_history: Vec<usize>,
    pub confidence_history: Vec<Option<f32>>,
    pub frames: Vec<Option<FrameResult>>,
}

impl SessionExport {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Suggested download name, e.g. `session_export_1700000000.json`.
    pub fn file_name(&self) -> String {
        format!(
            "session_export_{}.json",
            self.export_info.exported_at.unix_timestamp()
        )
    }
}

impl ExportInfo {
    pub fn new(session_id: Uuid, exported_at: OffsetDateTime) -> Self {
        Self {
            session_id,
            exported_at,
            system: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}
