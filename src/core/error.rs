use thiserror::Error;

#[derive(Error, Debug)]
pub enum GapError {
    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("Oracle output did not match the expected shape: {0}")]
    Schema(String),

    #[error("Unknown device or property: {device}.{property}")]
    UnknownProperty { device: String, property: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Household artifact error: {0}")]
    Artifact(String),

    #[error("Oracle retry budget exhausted: {failures} consecutive cell failures")]
    CircuitBreaker { failures: u32 },

    #[error("Worker task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GapError>;
