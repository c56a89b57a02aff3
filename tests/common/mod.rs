#![allow(dead_code, unused_imports)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from partcounter for tests
pub use partcounter::{
    AnalysisError, Config, FrameResult, PartDetector, PartType, Recommendation, Session,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn detector() -> PartDetector {
    PartDetector::new(Config::default()).expect("Default config must be valid")
}
