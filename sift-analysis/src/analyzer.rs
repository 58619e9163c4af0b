//! Track-level tempo analysis
//!
//! Validates the input, decodes it through a [`PcmDecoder`] and runs the
//! [`TempoEstimator`]. A tempo that cannot be determined is reported as
//! `bpm = 0`, not as an error.

use crate::camelot::{map_to_camelot, KeyMode};
use crate::cancel::CancelToken;
use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, Result};
use crate::format::AudioFormat;
use crate::pcm::{decode_samples, stage_bytes, AudioSamples, PcmDecoder};
use crate::tempo::{TempoEstimate, TempoEstimator};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Plausible range for a reported tempo
const RESULT_BPM_RANGE: std::ops::RangeInclusive<u32> = 20..=300;

/// Features extracted from one track
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Beats per minute, 0 if not detected
    pub bpm: u32,
    /// Musical key from metadata, e.g. "Am", "F#"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub musical_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_mode: Option<KeyMode>,
    /// Camelot code, e.g. "8A"; empty for unknown keys
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_camelot: String,
}

impl AnalysisResult {
    /// Attach a known key and derive its Camelot code
    pub fn with_key(mut self, key: &str, mode: KeyMode) -> Self {
        self.key_camelot = map_to_camelot(key, mode.as_str());
        self.musical_key = key.to_string();
        self.key_mode = Some(mode);
        self
    }

    /// Check if a tempo was found
    pub fn has_bpm(&self) -> bool {
        self.bpm > 0
    }
}

/// Tempo analyzer over a PCM decoder
pub struct Analyzer {
    decoder: Arc<dyn PcmDecoder>,
    config: AnalyzerConfig,
    estimator: TempoEstimator,
}

impl Analyzer {
    pub fn new(decoder: Arc<dyn PcmDecoder>, config: AnalyzerConfig) -> Self {
        Self {
            decoder,
            config,
            estimator: TempoEstimator::new(),
        }
    }

    /// Replace the tempo estimator (e.g. [`TempoEstimator::sequential`])
    pub fn with_estimator(mut self, estimator: TempoEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze an in-memory upload; `file_name` selects the format
    ///
    /// Input is rejected before anything is written to disk when it is
    /// empty, of an unsupported format or over the size ceiling.
    pub fn analyze_bytes(
        &self,
        data: &[u8],
        file_name: &str,
        cancel: &CancelToken,
    ) -> Result<AnalysisResult> {
        cancel.check()?;
        if data.is_empty() {
            return Err(AnalysisError::EmptyInput);
        }
        let format = AudioFormat::from_file_name(file_name)
            .ok_or_else(|| AnalysisError::UnsupportedFormat(file_name.to_string()))?;
        self.check_size(data.len() as u64)?;

        let staged = stage_bytes(data, format)?;
        let samples = decode_samples(
            self.decoder.as_ref(),
            staged.path(),
            self.config.sample_rate,
            cancel,
        )?;
        drop(staged);

        self.finish(&samples, cancel)
    }

    /// Analyze an audio file on disk
    pub fn analyze_path(&self, path: &Path, cancel: &CancelToken) -> Result<AnalysisResult> {
        cancel.check()?;
        let metadata = std::fs::metadata(path)
            .map_err(|e| AnalysisError::invalid_file(path, e.to_string()))?;
        if !metadata.is_file() {
            return Err(AnalysisError::invalid_file(path, "not a regular file"));
        }
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if AudioFormat::from_extension(ext).is_none() {
            return Err(AnalysisError::UnsupportedFormat(ext.to_string()));
        }
        self.check_size(metadata.len())?;

        let samples = decode_samples(self.decoder.as_ref(), path, self.config.sample_rate, cancel)?;
        self.finish(&samples, cancel)
    }

    /// Analyze already-decoded mono samples
    pub fn analyze_samples(&self, samples: &AudioSamples) -> Result<AnalysisResult> {
        self.analyze_samples_with_cancel(samples, &CancelToken::new())
    }

    /// Analyze already-decoded mono samples, stopping between segments once
    /// `cancel` fires
    pub fn analyze_samples_with_cancel(
        &self,
        samples: &AudioSamples,
        cancel: &CancelToken,
    ) -> Result<AnalysisResult> {
        cancel.check()?;
        let duration_secs = samples.duration_secs();
        if duration_secs < self.config.min_duration_secs {
            return Err(AnalysisError::TooShortForAnalysis {
                duration_secs,
                min_secs: self.config.min_duration_secs,
            });
        }

        let estimate = self.estimator.estimate_with_cancel(samples, cancel)?;
        let bpm = if RESULT_BPM_RANGE.contains(&estimate.bpm) {
            estimate.bpm
        } else {
            0
        };

        info!(
            bpm,
            score = estimate.score,
            segments = estimate.segments_analyzed,
            duration_secs,
            "Tempo analysis complete"
        );
        Ok(AnalysisResult {
            bpm,
            ..AnalysisResult::default()
        })
    }

    /// Run the tempo estimator without range filtering or duration checks
    pub fn estimate(&self, samples: &AudioSamples) -> TempoEstimate {
        self.estimator.estimate(samples)
    }

    fn check_size(&self, size: u64) -> Result<()> {
        if size > self.config.max_input_bytes {
            return Err(AnalysisError::InputTooLarge {
                size,
                limit: self.config.max_input_bytes,
            });
        }
        Ok(())
    }

    fn finish(&self, samples: &AudioSamples, cancel: &CancelToken) -> Result<AnalysisResult> {
        debug!(
            samples = samples.len(),
            sample_rate = samples.sample_rate,
            "Decoded track"
        );
        self.analyze_samples_with_cancel(samples, cancel)
    }
}
