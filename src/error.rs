use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),
    #[error("Confidence threshold {0} is outside [0, 1]")]
    InvalidConfidenceThreshold(f32),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
