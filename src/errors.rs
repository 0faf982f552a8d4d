use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Cannot update configuration {path}: {message}")]
    ConfigUpdate { path: PathBuf, message: String },

    #[error("Invalid glob pattern: {0}")]
    InvalidPattern(#[from] globset::Error),

    #[error("Path {path} is not under project root {root}")]
    PathResolution { path: PathBuf, root: PathBuf },

    #[error("Fact extraction failed for {file}: {message}")]
    Extraction { file: PathBuf, message: String },

    #[error("Cache error: {0}")]
    Cache(String),
}

/// Failure of a single work item inside a parallel batch.
#[derive(Debug, Error)]
pub enum TaskError<E: std::fmt::Display> {
    #[error("task failed: {0}")]
    Failed(E),

    #[error("task panicked: {0}")]
    Panicked(String),
}
