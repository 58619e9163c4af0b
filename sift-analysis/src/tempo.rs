//! Tempo estimation by multi-segment onset autocorrelation
//!
//! Up to four 15 second segments spread across the track are analyzed
//! independently: bass-emphasis filter, RMS energy envelope, adaptive onset
//! signal, then normalized autocorrelation over the 60-200 BPM lag range.
//! Each confident segment votes for its tempo and for its half/double
//! tempo, and a genre-aware score picks the winner.

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::filter::bass_emphasis;
use crate::onset::{adaptive_onset, energy_envelope, FrameLayout, LOCAL_MEAN_FRAMES, MIN_FRAMES};
use crate::pcm::AudioSamples;
use std::collections::BTreeMap;
use std::thread;
use tracing::debug;

/// Slowest tempo considered during voting
pub const MIN_BPM: u32 = 60;
/// Fastest tempo considered during voting
pub const MAX_BPM: u32 = 200;

const SEGMENT_SECS: usize = 15;
const MAX_SEGMENTS: usize = 4;
const MIN_SEGMENT_SECS: usize = 5;

/// A segment estimate must beat this correlation to vote
const MIN_CONFIDENCE: f64 = 0.3;
/// Peaks below this fraction of the maximum correlation are ignored
const PEAK_THRESHOLD: f64 = 0.3;
/// A half-lag peak this strong relative to the top peak wins
const OCTAVE_RATIO: f64 = 0.7;
/// Tolerance (frames) when looking for the half-lag peak
const HALF_LAG_TOLERANCE: usize = 2;
/// Minimum winning score when several segments were analyzed
const MIN_WINNING_SCORE: u32 = 2;

/// Contiguous `[start, end)` sample range of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
}

impl Segment {
    /// Length in samples
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Split a track into up to four evenly spaced 15 s segments
///
/// Tracks shorter than one segment are analyzed whole. Segments shorter
/// than 5 s are dropped.
pub fn plan_segments(total_samples: usize, sample_rate: u32) -> Vec<Segment> {
    let rate = sample_rate as usize;
    let segment_len = SEGMENT_SECS * rate;
    let min_len = MIN_SEGMENT_SECS * rate;

    let candidates: Vec<Segment> = if total_samples < segment_len {
        vec![Segment {
            start: 0,
            end: total_samples,
        }]
    } else {
        let step = (total_samples - segment_len) / MAX_SEGMENTS;
        (0..MAX_SEGMENTS)
            .map(|i| {
                let start = i * step;
                Segment {
                    start,
                    end: (start + segment_len).min(total_samples),
                }
            })
            .collect()
    };

    candidates
        .into_iter()
        .filter(|s| !s.is_empty() && s.len() >= min_len)
        .collect()
}

/// Autocorrelation peak
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LagPeak {
    /// Lag in onset frames
    pub lag: usize,
    /// Correlation normalized by the zero-lag energy
    pub value: f64,
    /// Height above the lowest of the four neighbouring lags
    pub prominence: f64,
}

/// Tempo candidate from one segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentEstimate {
    pub bpm: u32,
    /// Normalized correlation at the chosen lag
    pub confidence: f64,
}

/// Normalized autocorrelation over lags `min_lag..=max_lag`
///
/// Returns an empty vector when the signal carries no energy.
pub(crate) fn normalized_autocorrelation(
    onset: &[f64],
    min_lag: usize,
    max_lag: usize,
) -> Vec<f64> {
    let zero_lag: f64 = onset.iter().map(|o| o * o).sum();
    if zero_lag <= 0.0 || max_lag < min_lag {
        return Vec::new();
    }

    (min_lag..=max_lag)
        .map(|lag| {
            let sum: f64 = onset
                .iter()
                .zip(onset.iter().skip(lag))
                .map(|(a, b)| a * b)
                .sum();
            sum / zero_lag
        })
        .collect()
}

/// Local maxima that strictly exceed two neighbours on each side
///
/// `first_lag` is the lag of `correlations[0]`. Only peaks above 30% of the
/// maximum correlation are kept.
pub(crate) fn pick_peaks(correlations: &[f64], first_lag: usize) -> Vec<LagPeak> {
    let max_corr = correlations.iter().copied().fold(0.0f64, f64::max);
    if max_corr <= 0.0 || correlations.len() < 5 {
        return Vec::new();
    }

    let mut peaks = Vec::new();
    for i in 2..correlations.len() - 2 {
        let c = correlations[i];
        let neighbours = [
            correlations[i - 2],
            correlations[i - 1],
            correlations[i + 1],
            correlations[i + 2],
        ];
        if !neighbours.iter().all(|&n| c > n) || c <= max_corr * PEAK_THRESHOLD {
            continue;
        }
        let lowest = neighbours.iter().copied().fold(f64::INFINITY, f64::min);
        peaks.push(LagPeak {
            lag: i + first_lag,
            value: c,
            prominence: c - lowest,
        });
    }
    peaks
}

/// Estimate one segment's tempo from its onset signal
///
/// Picks the strongest autocorrelation peak, then prefers a peak near half
/// that lag if it is at least 70% as strong (resolves double-period picks).
pub fn autocorrelation_bpm(onset: &[f64], frames_per_second: f64) -> Option<SegmentEstimate> {
    let min_lag = ((60.0 / MAX_BPM as f64 * frames_per_second).round() as usize).max(1);
    let mut max_lag = (60.0 / MIN_BPM as f64 * frames_per_second).round() as usize;
    if max_lag >= onset.len() / 2 {
        max_lag = (onset.len() / 2).checked_sub(1)?;
    }
    if max_lag <= min_lag {
        return None;
    }

    let correlations = normalized_autocorrelation(onset, min_lag, max_lag);
    let mut peaks = pick_peaks(&correlations, min_lag);
    if peaks.is_empty() {
        return None;
    }

    // Stable: equal values keep ascending lag order
    peaks.sort_by(|a, b| b.value.total_cmp(&a.value));

    let top = peaks[0];
    let half_lag = top.lag / 2;
    let chosen = peaks
        .iter()
        .find(|p| p.lag.abs_diff(half_lag) <= HALF_LAG_TOLERANCE && p.value >= top.value * OCTAVE_RATIO)
        .copied()
        .unwrap_or(top);

    let bpm = (60.0 * frames_per_second / chosen.lag as f64).round() as u32;
    if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
        return None;
    }

    Some(SegmentEstimate {
        bpm,
        confidence: chosen.value,
    })
}

/// Outcome of analyzing one segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentOutcome {
    /// Too few frames to analyze
    Skipped,
    /// Analyzed, but no confident tempo
    Rejected,
    /// Confident tempo that takes part in voting
    Accepted(SegmentEstimate),
    /// Abandoned because the cancel token fired
    Cancelled,
}

/// Run filter, envelope, onset and autocorrelation over one segment
///
/// `cancel` is checked before each stage.
pub(crate) fn analyze_segment(
    samples: &[f64],
    sample_rate: u32,
    cancel: &CancelToken,
) -> SegmentOutcome {
    let layout = FrameLayout::for_sample_rate(sample_rate);
    if layout.frame_count(samples.len()) < MIN_FRAMES {
        return SegmentOutcome::Skipped;
    }
    if cancel.is_cancelled() {
        return SegmentOutcome::Cancelled;
    }

    let filtered = bass_emphasis(samples, sample_rate);
    if cancel.is_cancelled() {
        return SegmentOutcome::Cancelled;
    }

    let energy = energy_envelope(&filtered, layout);
    let onset = adaptive_onset(&energy, LOCAL_MEAN_FRAMES);
    if cancel.is_cancelled() {
        return SegmentOutcome::Cancelled;
    }

    match autocorrelation_bpm(&onset, layout.frames_per_second(sample_rate)) {
        Some(estimate) if estimate.confidence > MIN_CONFIDENCE => SegmentOutcome::Accepted(estimate),
        _ => SegmentOutcome::Rejected,
    }
}

/// Preference for tempo ranges common in DJ music
pub fn genre_bonus(bpm: u32) -> u32 {
    match bpm {
        115..=135 => 2, // house / techno
        136..=150 => 1, // trance / drum and bass
        85..=95 => 1,   // hip-hop
        _ => 0,
    }
}

/// Cross-segment vote tally
///
/// Backed by an ordered map so scoring visits candidates in ascending BPM
/// order regardless of which segment reported first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TempoVotes {
    tallies: BTreeMap<u32, u32>,
}

impl TempoVotes {
    /// Create an empty tally
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one vote for `bpm` plus octave votes for its half and double
    pub fn cast(&mut self, bpm: u32) {
        self.add(bpm);
        let half = bpm / 2;
        let double = bpm * 2;
        if (MIN_BPM..=MAX_BPM).contains(&half) {
            self.add(half);
        }
        if (MIN_BPM..=MAX_BPM).contains(&double) {
            self.add(double);
        }
    }

    fn add(&mut self, bpm: u32) {
        *self.tallies.entry(bpm).or_insert(0) += 1;
    }

    /// Check if no votes were cast
    pub fn is_empty(&self) -> bool {
        self.tallies.is_empty()
    }

    /// Raw `(bpm, votes)` pairs in ascending BPM order
    pub fn tallies(&self) -> Vec<(u32, u32)> {
        self.tallies.iter().map(|(&b, &v)| (b, v)).collect()
    }

    /// Highest `votes + genre_bonus`; ties go to the larger BPM
    pub fn winner(&self) -> Option<(u32, u32)> {
        let mut best: Option<(u32, u32)> = None;
        for (&bpm, &votes) in &self.tallies {
            let score = votes + genre_bonus(bpm);
            // Ascending iteration, so an equal score replaces the smaller BPM
            match best {
                Some((_, s)) if score < s => {}
                _ => best = Some((bpm, score)),
            }
        }
        best
    }
}

/// Result of tempo estimation over a whole track
#[derive(Debug, Clone, PartialEq)]
pub struct TempoEstimate {
    /// Winning tempo, 0 when undetermined
    pub bpm: u32,
    /// Winning score (votes plus genre bonus)
    pub score: u32,
    /// Segments long enough to analyze and not cancelled
    pub segments_analyzed: usize,
    /// Per-segment outcomes in track order
    pub outcomes: Vec<SegmentOutcome>,
    /// Final vote tally
    pub votes: TempoVotes,
}

impl TempoEstimate {
    fn undetected(outcomes: Vec<SegmentOutcome>, votes: TempoVotes, score: u32) -> Self {
        let segments_analyzed = count_analyzed(&outcomes);
        Self {
            bpm: 0,
            score,
            segments_analyzed,
            outcomes,
            votes,
        }
    }
}

fn count_analyzed(outcomes: &[SegmentOutcome]) -> usize {
    outcomes
        .iter()
        .filter(|o| !matches!(o, SegmentOutcome::Skipped | SegmentOutcome::Cancelled))
        .count()
}

/// Multi-segment tempo estimator
#[derive(Debug, Clone)]
pub struct TempoEstimator {
    parallel: bool,
}

impl Default for TempoEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl TempoEstimator {
    /// Create an estimator that analyzes segments on scoped worker threads
    pub fn new() -> Self {
        Self { parallel: true }
    }

    /// Create an estimator that analyzes segments one after another
    pub fn sequential() -> Self {
        Self { parallel: false }
    }

    /// Estimate the tempo of `audio`; never fails, 0 BPM means undetermined
    pub fn estimate(&self, audio: &AudioSamples) -> TempoEstimate {
        self.run(audio, &CancelToken::new())
    }

    /// Estimate the tempo of `audio`, abandoning remaining segments once
    /// `cancel` fires
    pub fn estimate_with_cancel(
        &self,
        audio: &AudioSamples,
        cancel: &CancelToken,
    ) -> Result<TempoEstimate> {
        cancel.check()?;
        let estimate = self.run(audio, cancel);
        cancel.check()?;
        Ok(estimate)
    }

    fn run(&self, audio: &AudioSamples, cancel: &CancelToken) -> TempoEstimate {
        let sample_rate = audio.sample_rate;
        let segments = plan_segments(audio.len(), sample_rate);
        let windows: Vec<&[f64]> = segments
            .iter()
            .map(|s| &audio.samples[s.start..s.end])
            .collect();

        let outcomes: Vec<SegmentOutcome> = if self.parallel && windows.len() > 1 {
            thread::scope(|scope| {
                let handles: Vec<_> = windows
                    .iter()
                    .map(|w| scope.spawn(move || analyze_segment(w, sample_rate, cancel)))
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or(SegmentOutcome::Skipped))
                    .collect()
            })
        } else {
            windows
                .iter()
                .map(|w| analyze_segment(w, sample_rate, cancel))
                .collect()
        };

        let mut votes = TempoVotes::new();
        for (segment, outcome) in segments.iter().zip(&outcomes) {
            debug!(
                start = segment.start,
                end = segment.end,
                ?outcome,
                "Segment tempo"
            );
            if let SegmentOutcome::Accepted(estimate) = outcome {
                votes.cast(estimate.bpm);
            }
        }

        let Some((bpm, score)) = votes.winner() else {
            return TempoEstimate::undetected(outcomes, votes, 0);
        };

        // Prefer no answer over a guess that only one segment supports
        let segments_analyzed = count_analyzed(&outcomes);
        if score < MIN_WINNING_SCORE && segments_analyzed > 1 {
            return TempoEstimate::undetected(outcomes, votes, score);
        }

        TempoEstimate {
            bpm,
            score,
            segments_analyzed,
            outcomes,
            votes,
        }
    }
}

/// Estimate the tempo of `audio` with the default estimator
pub fn detect_bpm(audio: &AudioSamples) -> u32 {
    TempoEstimator::new().estimate(audio).bpm
}
