// file: src/error.rs
// description: Custom error types and result type aliases
// reference: https://docs.rs/thiserror

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },

    #[error("Cannot read video source {path}: {message}")]
    SourceUnreadable { path: PathBuf, message: String },

    #[error("Video source {0} yielded no frames")]
    NoFrames(PathBuf),

    #[error("No SSTV signal found: {0}")]
    NoSignal(String),

    #[error("Unsupported SSTV mode (VIS code {0:#04x})")]
    UnsupportedMode(u8),

    #[error("Nothing to assemble: no decoded frames in {0}")]
    NothingToAssemble(PathBuf),

    #[error("File operation failed for {path}: {source}")]
    FileOperation {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Failures of external processes that may succeed on another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::Tool { .. } | PipelineError::Timeout(_))
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn file_operation(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::FileOperation {
            path: path.into(),
            source,
        }
    }
}
