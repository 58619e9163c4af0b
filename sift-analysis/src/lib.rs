//! Audio feature extraction for Sift
//!
//! Provides multi-segment tempo estimation, waveform peak extraction,
//! and Camelot key notation for harmonic mixing. Audio is decoded by an
//! external ffmpeg process behind the [`PcmDecoder`] port.

mod analyzer;
mod camelot;
mod cancel;
mod config;
mod error;
mod filter;
mod format;
mod onset;
mod pcm;
mod tempo;
mod waveform;

pub use analyzer::{AnalysisResult, Analyzer};
pub use camelot::{
    camelot_for_name, is_key_compatible, map_to_camelot, CamelotKey, KeyMode, KeyTransition,
    MusicalKey, ParseKeyModeError,
};
pub use cancel::CancelToken;
pub use config::{
    validate_binary_path, AnalyzerConfig, DecoderConfig, WaveformConfig, FFMPEG_PATH_ENV,
    FFPROBE_PATH_ENV,
};
pub use error::{AnalysisError, Result};
pub use filter::{bass_emphasis, BassEmphasisFilter};
pub use format::{detect_format, require_format, sanitize_extension, validate_input_path, AudioFormat};
pub use onset::{adaptive_onset, energy_envelope, FrameLayout};
pub use pcm::{decode_bytes, decode_samples, stage_bytes, AudioSamples, FfmpegDecoder, PcmDecoder};
pub use tempo::{
    autocorrelation_bpm, detect_bpm, genre_bonus, plan_segments, Segment, SegmentEstimate,
    SegmentOutcome, TempoEstimate, TempoEstimator, TempoVotes, MAX_BPM, MIN_BPM,
};
pub use waveform::{
    peak_count, pcm_to_peaks, synthetic_peaks, WaveformData, WaveformGenerator, WAVEFORM_VERSION,
};
