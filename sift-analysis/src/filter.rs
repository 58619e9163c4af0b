//! Bass-emphasis biquad low-pass filter
//!
//! Keeps kick-drum fundamentals and discards broadband content so the
//! onset envelope follows percussive low end.

use std::f64::consts::PI;

/// Cutoff used for tempo analysis (Hz)
pub(crate) const BASS_CUTOFF_HZ: f64 = 200.0;

/// Butterworth Q
pub(crate) const BUTTERWORTH_Q: f64 = 0.707;

/// Direct-form I biquad low-pass
#[derive(Debug, Clone)]
pub struct BassEmphasisFilter {
    // Normalized coefficients (a0 folded in)
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    // State
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BassEmphasisFilter {
    /// Create the standard 200 Hz Butterworth low-pass for `sample_rate`
    pub fn new(sample_rate: u32) -> Self {
        Self::low_pass(sample_rate, BASS_CUTOFF_HZ, BUTTERWORTH_Q)
    }

    /// Create a low-pass with an arbitrary cutoff and Q
    pub fn low_pass(sample_rate: u32, cutoff: f64, q: f64) -> Self {
        let fc = cutoff / sample_rate.max(1) as f64;
        let omega = 2.0 * PI * fc;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = (1.0 - cos_omega) / 2.0;
        let b1 = 1.0 - cos_omega;
        let b2 = (1.0 - cos_omega) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Clear the recurrence state
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    /// Filter one sample
    #[inline]
    pub fn process_sample(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y
    }

    /// Filter a whole window starting from zero state
    pub fn apply(&mut self, samples: &[f64]) -> Vec<f64> {
        self.reset();
        samples.iter().map(|&x| self.process_sample(x)).collect()
    }
}

/// Low-pass `samples` at 200 Hz with fresh filter state
pub fn bass_emphasis(samples: &[f64], sample_rate: u32) -> Vec<f64> {
    BassEmphasisFilter::new(sample_rate).apply(samples)
}
