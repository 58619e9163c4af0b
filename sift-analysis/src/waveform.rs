//! Waveform peak extraction for UI rendering
//!
//! Audio is decoded at a low sample rate and downsampled into a fixed number
//! of peaks per second. When decoding fails the generator produces a
//! deterministic synthetic envelope instead, so callers always get a
//! displayable waveform for a file whose duration is known.

use crate::cancel::CancelToken;
use crate::config::WaveformConfig;
use crate::error::{AnalysisError, Result};
use crate::format::{require_format, validate_input_path, AudioFormat};
use crate::pcm::{stage_bytes, PcmDecoder, I16_FULL_SCALE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Serialized format version
pub const WAVEFORM_VERSION: u32 = 1;

/// Lowest peak emitted for decoded audio, keeps silence visible
pub(crate) const MIN_PEAK: f64 = 0.05;

/// Waveform peaks for a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveformData {
    /// Normalized peak magnitudes (0.0-1.0)
    pub peaks: Vec<f64>,
    /// Peaks per second
    pub sample_rate: u32,
    /// Track duration in seconds
    pub duration: f64,
    pub version: u32,
}

impl WaveformData {
    /// Create waveform data at the current format version
    pub fn new(peaks: Vec<f64>, sample_rate: u32, duration: f64) -> Self {
        Self {
            peaks,
            sample_rate,
            duration,
            version: WAVEFORM_VERSION,
        }
    }

    /// Check the data is renderable: non-empty, positive rate and duration,
    /// every peak within 0.0-1.0
    pub fn validate(&self) -> bool {
        !self.peaks.is_empty()
            && self.sample_rate > 0
            && self.duration > 0.0
            && self.peaks.iter().all(|p| (0.0..=1.0).contains(p))
    }

    /// Get the number of peaks
    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    /// Get peak at a normalized position (0.0-1.0)
    pub fn peak_at(&self, position: f64) -> f64 {
        if self.peaks.is_empty() {
            return 0.0;
        }
        let idx = ((position.clamp(0.0, 1.0) * self.peaks.len() as f64) as usize).min(self.peaks.len() - 1);
        self.peaks[idx]
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Target peak count: `round(duration * rate)` clamped to `1..=cap`
pub fn peak_count(duration_secs: f64, peaks_per_second: u32, cap: usize) -> usize {
    let cap = cap.max(1);
    let n = (duration_secs * peaks_per_second as f64).round();
    if !n.is_finite() || n < 1.0 {
        return 1;
    }
    if n >= cap as f64 {
        cap
    } else {
        n as usize
    }
}

/// Downsample signed 16-bit mono PCM into `target` normalized peaks
///
/// Each peak is the largest magnitude in its chunk, floored at
/// [`MIN_PEAK`]. PCM shorter than one sample yields synthetic peaks.
pub fn pcm_to_peaks(pcm: &[u8], target: usize) -> Vec<f64> {
    let target = target.max(1);
    let samples: Vec<i16> = pcm
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    if samples.is_empty() {
        return synthetic_peaks(target);
    }

    let per_peak = (samples.len() / target).max(1);
    (0..target)
        .map(|i| {
            let start = (i * per_peak).min(samples.len());
            let end = (start + per_peak).min(samples.len());
            let max_abs = samples[start..end]
                .iter()
                .map(|&s| (s as i32).unsigned_abs())
                .max()
                .unwrap_or(0);
            (max_abs as f64 / I16_FULL_SCALE).max(MIN_PEAK)
        })
        .collect()
}

/// Deterministic stand-in envelope of `n` peaks within 0.1-1.0
///
/// A pure function of index and length: a sawtooth-like base pattern with a
/// gentle hump toward the middle.
pub fn synthetic_peaks(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64 / n as f64;
            let base = 0.3 + 0.4 * (((i * 7) % 100) as f64 / 100.0);
            let taper = 0.1 * (1.0 - (t - 0.5) * (t - 0.5) * 4.0);
            (base + taper).clamp(0.1, 1.0)
        })
        .collect()
}

/// Waveform generator over a PCM decoder
pub struct WaveformGenerator {
    decoder: Arc<dyn PcmDecoder>,
    config: WaveformConfig,
}

impl WaveformGenerator {
    pub fn new(decoder: Arc<dyn PcmDecoder>, config: WaveformConfig) -> Self {
        Self { decoder, config }
    }

    pub fn config(&self) -> &WaveformConfig {
        &self.config
    }

    /// Generate waveform data for an audio file on disk
    ///
    /// Fails when the file is missing, has an unsupported extension or its
    /// duration cannot be read. A failed PCM decode falls back to synthetic
    /// peaks; cancellation always propagates.
    pub fn generate(&self, path: &Path, cancel: &CancelToken) -> Result<WaveformData> {
        cancel.check()?;

        if !path.is_file() {
            return Err(AnalysisError::invalid_file(path, "file not found"));
        }
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        require_format(ext)?;
        validate_input_path(path)?;

        let duration = match self.decoder.probe_duration(path, cancel) {
            Ok(d) => d,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e @ AnalysisError::InvalidAudioFile { .. }) => return Err(e),
            Err(e) => return Err(AnalysisError::invalid_file(path, e.to_string())),
        };

        let target = peak_count(duration, self.config.peaks_per_second, self.config.max_peaks);
        let peaks = match self
            .decoder
            .decode_pcm(path, self.config.decode_sample_rate, cancel)
        {
            Ok(pcm) if pcm.len() >= 2 => pcm_to_peaks(&pcm, target),
            Ok(_) => {
                warn!(path = %path.display(), "Decoder produced no audio, using synthetic waveform");
                synthetic_peaks(target)
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Decode failed, using synthetic waveform");
                synthetic_peaks(target)
            }
        };

        info!(
            path = %path.display(),
            duration,
            peaks = peaks.len(),
            "Generated waveform"
        );
        Ok(WaveformData::new(peaks, self.config.peaks_per_second, duration))
    }

    /// Generate waveform data from an in-memory buffer of the given format
    pub fn generate_from_bytes(
        &self,
        data: &[u8],
        format: &str,
        cancel: &CancelToken,
    ) -> Result<WaveformData> {
        cancel.check()?;
        if data.is_empty() {
            return Err(AnalysisError::EmptyInput);
        }
        let format: AudioFormat = require_format(format)?;

        // Removed when `staged` drops, on every return path
        let staged = stage_bytes(data, format)?;
        self.generate(staged.path(), cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::NamedTempFile;

    /// Reports a fixed duration and replays fixed PCM, counting calls
    struct FakeDecoder {
        duration: f64,
        pcm: Option<Vec<u8>>,
        decodes: AtomicUsize,
        duration_queries: AtomicUsize,
    }

    impl FakeDecoder {
        fn new(duration: f64, pcm: Option<Vec<u8>>) -> Arc<Self> {
            Arc::new(Self {
                duration,
                pcm,
                decodes: AtomicUsize::new(0),
                duration_queries: AtomicUsize::new(0),
            })
        }
    }

    impl PcmDecoder for FakeDecoder {
        fn decode_pcm(&self, _path: &Path, rate: u32, _cancel: &CancelToken) -> Result<Vec<u8>> {
            assert_eq!(rate, 8000);
            self.decodes.fetch_add(1, Ordering::SeqCst);
            self.pcm.clone().ok_or_else(|| AnalysisError::Decode {
                tool: "fake".into(),
                status: "exit status: 1".into(),
                stderr: "corrupt".into(),
            })
        }

        fn probe_duration(&self, _path: &Path, _cancel: &CancelToken) -> Result<f64> {
            self.duration_queries.fetch_add(1, Ordering::SeqCst);
            Ok(self.duration)
        }
    }

    fn generator(decoder: Arc<FakeDecoder>) -> WaveformGenerator {
        WaveformGenerator::new(decoder, WaveformConfig::default())
    }

    fn audio_file(ext: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .prefix("sift-waveform-test-")
            .suffix(ext)
            .tempfile()
            .unwrap();
        file.write_all(b"not really audio").unwrap();
        file
    }

    fn pcm_of(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_validate() {
        let valid = WaveformData::new(vec![0.0, 0.5, 1.0], 100, 0.03);
        assert!(valid.validate());

        let cases = [
            WaveformData::new(vec![], 100, 1.0),
            WaveformData::new(vec![0.5], 0, 1.0),
            WaveformData::new(vec![0.5], 100, 0.0),
            WaveformData::new(vec![0.5], 100, -1.0),
            WaveformData::new(vec![0.5, -0.01], 100, 1.0),
            WaveformData::new(vec![1.01], 100, 1.0),
            WaveformData::new(vec![f64::NAN], 100, 1.0),
        ];
        for data in cases {
            assert!(!data.validate(), "{:?} should be invalid", data);
        }
    }

    #[test]
    fn test_synthetic_peaks_deterministic_and_bounded() {
        for n in [1, 2, 100, 1000, 100_000] {
            let a = synthetic_peaks(n);
            assert_eq!(a.len(), n);
            assert_eq!(a, synthetic_peaks(n));
            assert!(a.iter().all(|p| (0.1..=1.0).contains(p)));
        }
        assert!(synthetic_peaks(0).is_empty());
    }

    #[test]
    fn test_synthetic_peaks_formula() {
        let peaks = synthetic_peaks(100);
        // i = 0: base 0.3, t = 0 so taper is 0
        assert!((peaks[0] - 0.3).abs() < 1e-12);
        // i = 50: base 0.3 + 0.4 * 0.5, full taper 0.1
        assert!((peaks[50] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_json_roundtrip() {
        let data = WaveformData::new(synthetic_peaks(500), 100, 5.0);
        let json = data.to_json().unwrap();
        assert!(json.contains("\"peaks\""));
        assert!(json.contains("\"sampleRate\":100"));
        assert!(json.contains("\"duration\":5.0"));
        assert!(json.contains("\"version\":1"));
        assert_eq!(WaveformData::from_json(&json).unwrap(), data);
        assert!(WaveformData::from_json("{\"peaks\": 3}").is_err());
    }

    #[test]
    fn test_peak_count() {
        assert_eq!(peak_count(600.0, 100, 100_000), 60_000);
        assert_eq!(peak_count(1200.0, 100, 100_000), 100_000);
        assert_eq!(peak_count(0.001, 100, 100_000), 1);
        assert_eq!(peak_count(0.0, 100, 100_000), 1);
        assert_eq!(peak_count(f64::NAN, 100, 100_000), 1);
        assert_eq!(peak_count(2.345, 100, 100_000), 235);
    }

    #[test]
    fn test_pcm_to_peaks() {
        let pcm = pcm_of(&[0, 100, -16384, 50, 32767, -32768, 0, 0]);
        let peaks = pcm_to_peaks(&pcm, 4);
        assert_eq!(peaks.len(), 4);
        assert_eq!(peaks[0], MIN_PEAK);
        assert_eq!(peaks[1], 0.5);
        assert_eq!(peaks[2], 1.0);
        assert_eq!(peaks[3], MIN_PEAK);
    }

    #[test]
    fn test_pcm_to_peaks_more_targets_than_samples() {
        let peaks = pcm_to_peaks(&pcm_of(&[16384, 16384]), 5);
        assert_eq!(peaks, vec![0.5, 0.5, MIN_PEAK, MIN_PEAK, MIN_PEAK]);
    }

    #[test]
    fn test_pcm_to_peaks_too_short_is_synthetic() {
        assert_eq!(pcm_to_peaks(&[1], 10), synthetic_peaks(10));
        assert_eq!(pcm_to_peaks(&[], 10), synthetic_peaks(10));
    }

    #[test]
    fn test_generate_from_bytes_rejects_empty() {
        let decoder = FakeDecoder::new(1.0, Some(vec![0, 0]));
        let result = generator(decoder.clone()).generate_from_bytes(&[], "mp3", &CancelToken::new());
        assert!(matches!(result, Err(AnalysisError::EmptyInput)));
        assert_eq!(decoder.duration_queries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_generate_from_bytes_rejects_unknown_format() {
        let decoder = FakeDecoder::new(1.0, Some(vec![0, 0]));
        let result = generator(decoder.clone()).generate_from_bytes(b"data", "xyz", &CancelToken::new());
        assert!(matches!(result, Err(AnalysisError::UnsupportedFormat(_))));
        assert_eq!(decoder.duration_queries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_generate_cancelled_does_not_decode() {
        let decoder = FakeDecoder::new(1.0, Some(vec![0, 0]));
        let file = audio_file(".mp3");
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = generator(decoder.clone()).generate(file.path(), &cancel);
        assert!(matches!(result, Err(AnalysisError::Cancelled)));
        assert_eq!(decoder.duration_queries.load(Ordering::SeqCst), 0);
        assert_eq!(decoder.decodes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_generate_missing_file() {
        let decoder = FakeDecoder::new(1.0, Some(vec![0, 0]));
        let result = generator(decoder).generate(Path::new("/nonexistent/track.mp3"), &CancelToken::new());
        assert!(matches!(result, Err(AnalysisError::InvalidAudioFile { .. })));
    }

    #[test]
    fn test_generate_unsupported_extension() {
        let decoder = FakeDecoder::new(1.0, Some(vec![0, 0]));
        let file = audio_file(".txt");
        let result = generator(decoder).generate(file.path(), &CancelToken::new());
        assert!(matches!(result, Err(AnalysisError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_generate_ten_minutes() {
        // 600 s of 8 kHz silence with one loud sample
        let mut samples = vec![0i16; 600 * 8000];
        samples[0] = 16384;
        let decoder = FakeDecoder::new(600.0, Some(pcm_of(&samples)));
        let file = audio_file(".flac");

        let data = generator(decoder).generate(file.path(), &CancelToken::new()).unwrap();
        assert_eq!(data.len(), 60_000);
        assert_eq!(data.sample_rate, 100);
        assert_eq!(data.version, WAVEFORM_VERSION);
        assert_eq!(data.peaks[0], 0.5);
        assert_eq!(data.peaks[1], MIN_PEAK);
        assert!(data.validate());
    }

    #[test]
    fn test_generate_long_track_is_capped_with_fallback() {
        let decoder = FakeDecoder::new(1200.0, None);
        let file = audio_file(".mp3");

        let data = generator(decoder.clone()).generate(file.path(), &CancelToken::new()).unwrap();
        assert_eq!(data.len(), 100_000);
        assert_eq!(data.peaks, synthetic_peaks(100_000));
        assert_eq!(decoder.decodes.load(Ordering::SeqCst), 1);
        assert!(data.validate());
    }

    #[test]
    fn test_generate_from_bytes_stages_file() {
        let decoder = FakeDecoder::new(2.0, Some(pcm_of(&[8192; 16000])));
        let data = generator(decoder)
            .generate_from_bytes(b"payload", "M4A", &CancelToken::new())
            .unwrap();
        assert_eq!(data.len(), 200);
        assert!(data.peaks.iter().all(|&p| p == 0.25));
    }

    #[test]
    fn test_peak_at() {
        let data = WaveformData::new(vec![0.1, 0.2, 0.3], 100, 0.03);
        assert_eq!(data.peak_at(0.0), 0.1);
        assert_eq!(data.peak_at(0.5), 0.2);
        assert_eq!(data.peak_at(1.0), 0.3);
        assert_eq!(WaveformData::new(vec![], 100, 1.0).peak_at(0.5), 0.0);
    }
}
