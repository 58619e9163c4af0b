//! Error types for audio feature extraction
//!
//! Per-file failures (bad input, decoder trouble, short audio) are soft:
//! a batch caller records them and moves on. Cancellation is the one
//! condition that must abort the current call.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while decoding or analyzing a track
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid audio file '{path}': {reason}")]
    InvalidAudioFile { path: PathBuf, reason: String },

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio too short for analysis: {duration_secs:.2}s (need at least {min_secs:.0}s)")]
    TooShortForAnalysis { duration_secs: f64, min_secs: f64 },

    #[error("Empty audio data")]
    EmptyInput,

    #[error("Input of {size} bytes exceeds the {limit} byte limit")]
    InputTooLarge { size: u64, limit: u64 },

    #[error("{tool} exited with {status}: {stderr}")]
    Decode {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

impl AnalysisError {
    /// Create an invalid-file error for the given path
    pub fn invalid_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        AnalysisError::InvalidAudioFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True if the caller's deadline or cancel signal fired
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AnalysisError::Cancelled)
    }

    /// True if a batch caller should record this failure and continue
    pub fn is_recoverable(&self) -> bool {
        !self.is_cancelled()
    }
}
