pub mod config;
pub mod debug;
pub mod detection;
pub mod error;
pub mod models;
pub mod session;

pub use config::Config;
pub use debug::{DebugConfig, Stage};
pub use detection::PartDetector;
pub use error::{AnalysisError, Result};
pub use models::{BoundingBox, DetectedObject, FeatureRecord, FrameResult, PartType};
pub use session::{Recommendation, Session, SessionExport, SessionStats, StabilityReport};
