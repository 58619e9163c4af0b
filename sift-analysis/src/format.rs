//! Supported audio container formats and input-path hygiene

use crate::error::{AnalysisError, Result};
use std::fmt;
use std::path::Path;

/// Audio formats accepted by the analysis entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Mp3,
    Flac,
    Wav,
    Aac,
    Ogg,
    M4a,
}

impl AudioFormat {
    /// All supported formats
    pub const ALL: [AudioFormat; 6] = [
        AudioFormat::Mp3,
        AudioFormat::Flac,
        AudioFormat::Wav,
        AudioFormat::Aac,
        AudioFormat::Ogg,
        AudioFormat::M4a,
    ];

    /// Parse an extension such as `"mp3"`, `".FLAC"` (case-insensitive)
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.extension() == ext)
    }

    /// Format of a file name, judged by its final extension only
    pub fn from_file_name(name: &str) -> Option<Self> {
        Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        self.extension()
    }

    /// Lowercase extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
            AudioFormat::Aac => "aac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::M4a => "m4a",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Parse a caller-declared format, failing with `UnsupportedFormat`
pub fn require_format(declared: &str) -> Result<AudioFormat> {
    AudioFormat::from_extension(declared)
        .ok_or_else(|| AnalysisError::UnsupportedFormat(declared.to_string()))
}

/// Coarse codec family of a file name; `.m4a` reports as `"aac"`
pub fn detect_format(file_name: &str) -> &'static str {
    match AudioFormat::from_file_name(file_name) {
        Some(AudioFormat::M4a) | Some(AudioFormat::Aac) => "aac",
        Some(format) => format.extension(),
        None => "unknown",
    }
}

/// Extensions safe to use when naming a temporary file
const SAFE_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "aac", "m4a", "ogg", "wma", "aiff"];

/// Normalize a dotted extension for a temp file name, defaulting to `.mp3`
pub fn sanitize_extension(ext: &str) -> String {
    let lower = ext.to_ascii_lowercase();
    match lower.strip_prefix('.') {
        Some(bare) if SAFE_EXTENSIONS.contains(&bare) => lower,
        _ => ".mp3".to_string(),
    }
}

/// Reject paths the decoder cannot be handed as a single argument
///
/// The decoder is spawned without a shell, so quotes, brackets and `&`
/// are ordinary file-name characters. Only empty paths and control
/// characters (NUL, newline, carriage return, ...) are refused.
pub fn validate_input_path(path: &Path) -> Result<()> {
    let s = path.to_string_lossy();
    if s.is_empty() {
        return Err(AnalysisError::invalid_file(path, "empty path"));
    }
    if s.chars().any(char::is_control) {
        return Err(AnalysisError::invalid_file(path, "path contains control characters"));
    }
    Ok(())
}
