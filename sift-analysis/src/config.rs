//! Configuration for the decoder, tempo analyzer and waveform generator
//!
//! The only external knobs are the `FFMPEG_PATH` and `FFPROBE_PATH`
//! environment variables. Everything else has fixed defaults that callers
//! may override in code.

use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Environment variable overriding the ffmpeg executable
pub const FFMPEG_PATH_ENV: &str = "FFMPEG_PATH";
/// Environment variable overriding the ffprobe executable
pub const FFPROBE_PATH_ENV: &str = "FFPROBE_PATH";

const DEFAULT_FFMPEG: &str = "ffmpeg";
const DEFAULT_FFPROBE: &str = "ffprobe";

/// Characters that must never reach a subprocess argument or executable path
const SHELL_METACHARACTERS: &[char] = &[
    ';', '|', '&', '$', '`', '(', ')', '{', '}', '<', '>', '\'', '"', '\n', '\r',
];

/// Executables used to decode audio and read its duration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: DEFAULT_FFMPEG.to_string(),
            ffprobe_path: DEFAULT_FFPROBE.to_string(),
        }
    }
}

impl DecoderConfig {
    /// Load executable paths from `FFMPEG_PATH` / `FFPROBE_PATH`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load executable paths through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolve = |key: &str, default: &str| match lookup(key) {
            Some(value) if !value.is_empty() => validate_binary_path(&value, default),
            _ => default.to_string(),
        };

        Self {
            ffmpeg_path: resolve(FFMPEG_PATH_ENV, DEFAULT_FFMPEG),
            ffprobe_path: resolve(FFPROBE_PATH_ENV, DEFAULT_FFPROBE),
        }
    }
}

/// Check an executable override, falling back to `default` if it is unsafe
///
/// Accepted values are a bare program name (resolved on `PATH`) or an
/// absolute path, which is returned lexically cleaned. Anything containing
/// shell metacharacters or whitespace, and relative paths with separators,
/// are rejected.
pub fn validate_binary_path(value: &str, default: &str) -> String {
    if value == default {
        return value.to_string();
    }

    if value.contains(SHELL_METACHARACTERS) || value.chars().any(char::is_whitespace) {
        warn!(value, default, "Rejected executable override containing unsafe characters");
        return default.to_string();
    }

    let path = Path::new(value);
    if path.is_absolute() {
        return clean_path(path).to_string_lossy().into_owned();
    }

    if value.contains(std::path::MAIN_SEPARATOR) || value.contains('/') {
        warn!(value, default, "Rejected relative executable override");
        return default.to_string();
    }

    value.to_string()
}

/// Resolve `.` and `..` components without touching the filesystem
fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

/// Tempo analysis parameters
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Decode rate for tempo analysis (Hz); 22 kHz is plenty for beat tracking
    pub sample_rate: u32,
    /// Minimum decoded duration accepted for tempo analysis (seconds)
    pub min_duration_secs: f64,
    /// Largest byte buffer accepted by the byte-based entry point
    pub max_input_bytes: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            min_duration_secs: 5.0,
            max_input_bytes: 100 * 1024 * 1024,
        }
    }
}

/// Waveform extraction parameters
#[derive(Debug, Clone)]
pub struct WaveformConfig {
    /// Peaks emitted per second of audio
    pub peaks_per_second: u32,
    /// Decode rate for peak extraction (Hz)
    pub decode_sample_rate: u32,
    /// Upper bound on the number of peaks (~16.7 minutes at 100/s)
    pub max_peaks: usize,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            peaks_per_second: 100,
            decode_sample_rate: 8000,
            max_peaks: 100_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_paths() {
        let config = DecoderConfig::from_lookup(|_| None);
        assert_eq!(config, DecoderConfig::default());
        assert_eq!(config.ffmpeg_path, "ffmpeg");
        assert_eq!(config.ffprobe_path, "ffprobe");
    }

    #[test]
    fn test_env_override() {
        let config = DecoderConfig::from_lookup(lookup_from(&[
            (FFMPEG_PATH_ENV, "/custom/ffmpeg"),
            (FFPROBE_PATH_ENV, "/custom/ffprobe"),
        ]));
        assert_eq!(config.ffmpeg_path, "/custom/ffmpeg");
        assert_eq!(config.ffprobe_path, "/custom/ffprobe");
    }

    #[test]
    fn test_malicious_override_falls_back() {
        let config = DecoderConfig::from_lookup(lookup_from(&[
            (FFMPEG_PATH_ENV, "/custom/ffmpeg; rm -rf /"),
            (FFPROBE_PATH_ENV, "/custom/ffprobe | cat /etc/passwd"),
        ]));
        assert_eq!(config, DecoderConfig::default());
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let config = DecoderConfig::from_lookup(lookup_from(&[(FFMPEG_PATH_ENV, "")]));
        assert_eq!(config.ffmpeg_path, "ffmpeg");
    }

    #[test]
    fn test_validate_binary_path() {
        let cases = [
            ("ffmpeg", "ffmpeg"),
            ("/usr/bin/ffmpeg", "/usr/bin/ffmpeg"),
            ("/opt/ffmpeg/bin/ffmpeg", "/opt/ffmpeg/bin/ffmpeg"),
            ("/usr/bin/ffmpeg; rm -rf /", "ffmpeg"),
            ("/usr/bin/ffmpeg | cat", "ffmpeg"),
            ("/usr/bin/ffmpeg & malicious", "ffmpeg"),
            ("$HOME/ffmpeg", "ffmpeg"),
            ("`whoami`/ffmpeg", "ffmpeg"),
            ("/usr/bin/ffmpeg\nrm", "ffmpeg"),
            ("/usr/bin/ffmpeg -malicious", "ffmpeg"),
            ("./ffmpeg", "ffmpeg"),
            ("/usr/../../../etc/passwd", "/etc/passwd"),
            ("ffmpeg6", "ffmpeg6"),
        ];
        for (input, expected) in cases {
            assert_eq!(validate_binary_path(input, "ffmpeg"), expected, "input {:?}", input);
        }
    }

    #[test]
    fn test_default_limits() {
        let analyzer = AnalyzerConfig::default();
        assert_eq!(analyzer.sample_rate, 22050);
        assert_eq!(analyzer.max_input_bytes, 104_857_600);

        let waveform = WaveformConfig::default();
        assert_eq!(waveform.peaks_per_second, 100);
        assert_eq!(waveform.decode_sample_rate, 8000);
        assert_eq!(waveform.max_peaks, 100_000);
    }
}
