//! End-to-end runs of the tempo and waveform facades over a fake decoder

use sift_analysis::{
    AnalysisError, Analyzer, AnalyzerConfig, CancelToken, KeyMode, PcmDecoder, Result,
    WaveformConfig, WaveformData, WaveformGenerator,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Synthesizes a kick-like pulse train at whatever rate is requested
struct SyntheticDecoder {
    bpm: f64,
    secs: f64,
    calls: AtomicUsize,
}

impl SyntheticDecoder {
    fn new(bpm: f64, secs: f64) -> Arc<Self> {
        Arc::new(Self {
            bpm,
            secs,
            calls: AtomicUsize::new(0),
        })
    }
}

impl PcmDecoder for SyntheticDecoder {
    fn decode_pcm(&self, path: &Path, rate: u32, cancel: &CancelToken) -> Result<Vec<u8>> {
        cancel.check()?;
        assert!(path.exists());
        self.calls.fetch_add(1, Ordering::SeqCst);

        let len = (self.secs * rate as f64) as usize;
        let period = 60.0 / self.bpm * rate as f64;
        let click = (rate as usize / 500).max(1);
        let mut pcm = Vec::with_capacity(len * 2);
        for i in 0..len {
            let phase = (i as f64 % period) as usize;
            let sample: i16 = if phase < click { 24000 } else { 0 };
            pcm.extend_from_slice(&sample.to_le_bytes());
        }
        Ok(pcm)
    }

    fn probe_duration(&self, _path: &Path, cancel: &CancelToken) -> Result<f64> {
        cancel.check()?;
        Ok(self.secs)
    }
}

#[test]
fn tempo_from_uploaded_bytes() {
    let decoder = SyntheticDecoder::new(120.0, 30.0);
    let analyzer = Analyzer::new(decoder.clone(), AnalyzerConfig::default());

    let result = analyzer
        .analyze_bytes(b"fake mp3 payload", "upload.mp3", &CancelToken::new())
        .unwrap()
        .with_key("F#", KeyMode::Minor);

    assert!((118..=122).contains(&result.bpm), "got {} BPM", result.bpm);
    assert_eq!(result.key_camelot, "11A");
    assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn tempo_at_44k() {
    let decoder = SyntheticDecoder::new(120.0, 15.0);
    let config = AnalyzerConfig {
        sample_rate: 44100,
        ..AnalyzerConfig::default()
    };
    let result = Analyzer::new(decoder, config)
        .analyze_bytes(b"payload", "clip.flac", &CancelToken::new())
        .unwrap();
    assert!((118..=122).contains(&result.bpm), "got {} BPM", result.bpm);
}

#[test]
fn cancellation_is_distinct_from_decode_failure() {
    let decoder = SyntheticDecoder::new(120.0, 30.0);
    let analyzer = Analyzer::new(decoder.clone(), AnalyzerConfig::default());
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = analyzer.analyze_bytes(b"payload", "a.wav", &cancel).unwrap_err();
    assert!(err.is_cancelled());
    assert!(!err.is_recoverable());
    assert_eq!(decoder.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn waveform_from_uploaded_bytes() {
    let decoder = SyntheticDecoder::new(120.0, 12.0);
    let generator = WaveformGenerator::new(decoder, WaveformConfig::default());

    let data = generator
        .generate_from_bytes(b"payload", "ogg", &CancelToken::new())
        .unwrap();
    assert_eq!(data.len(), 1200);
    assert_eq!(data.sample_rate, 100);
    assert!(data.validate());

    // Clicks land in some buckets, silence floors the rest
    assert!(data.peaks.iter().any(|&p| p > 0.7));
    assert!(data.peaks.iter().any(|&p| p == 0.05));

    let json = data.to_json().unwrap();
    assert_eq!(WaveformData::from_json(&json).unwrap(), data);
}

#[test]
fn waveform_rejects_bad_input_without_decoding() {
    let decoder = SyntheticDecoder::new(120.0, 12.0);
    let generator = WaveformGenerator::new(decoder.clone(), WaveformConfig::default());
    let cancel = CancelToken::new();

    assert!(matches!(
        generator.generate_from_bytes(&[], "mp3", &cancel),
        Err(AnalysisError::EmptyInput)
    ));
    assert!(matches!(
        generator.generate_from_bytes(b"data", "xyz", &cancel),
        Err(AnalysisError::UnsupportedFormat(_))
    ));
    assert_eq!(decoder.calls.load(Ordering::SeqCst), 0);
}
