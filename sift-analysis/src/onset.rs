//! Energy envelope and adaptive onset strength
//!
//! Frames are 50 ms RMS windows on a 25 ms hop. The onset signal is the
//! positive deviation of each frame from the mean of the frames before it,
//! so it tracks sudden increases rather than sustained loudness.

/// Number of trailing frames used for the local mean
pub(crate) const LOCAL_MEAN_FRAMES: usize = 8;

/// Minimum number of frames for a segment to be worth analyzing
pub(crate) const MIN_FRAMES: usize = 20;

/// Frame geometry derived from the sample rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    /// Window length in samples (50 ms)
    pub window: usize,
    /// Hop length in samples (25 ms)
    pub hop: usize,
}

impl FrameLayout {
    /// Standard 50 ms / 25 ms layout for `sample_rate`
    pub fn for_sample_rate(sample_rate: u32) -> Self {
        let window = (sample_rate / 20).max(2) as usize;
        Self {
            window,
            hop: window / 2,
        }
    }

    /// Number of full frames in `len` samples
    pub fn frame_count(&self, len: usize) -> usize {
        len.saturating_sub(self.window) / self.hop
    }

    /// Onset frames per second
    pub fn frames_per_second(&self, sample_rate: u32) -> f64 {
        sample_rate as f64 / self.hop as f64
    }
}

/// Windowed RMS of `filtered`, normalized so the loudest frame is 1.0
///
/// Normalization is skipped when every frame is silent.
pub fn energy_envelope(filtered: &[f64], layout: FrameLayout) -> Vec<f64> {
    let frames = layout.frame_count(filtered.len());
    let mut energy: Vec<f64> = (0..frames)
        .map(|i| {
            let start = i * layout.hop;
            let window = &filtered[start..start + layout.window];
            let sum: f64 = window.iter().map(|s| s * s).sum();
            (sum / layout.window as f64).sqrt()
        })
        .collect();

    let max = energy.iter().copied().fold(0.0f64, f64::max);
    if max > 0.0 {
        for e in &mut energy {
            *e /= max;
        }
    }

    energy
}

/// Positive deviation of each frame from the mean of up to `window_len` preceding frames
///
/// Frame 0 has no history and is always 0.
pub fn adaptive_onset(energy: &[f64], window_len: usize) -> Vec<f64> {
    let mut onset = vec![0.0; energy.len()];
    let window_len = window_len.max(1);

    for i in 1..energy.len() {
        let start = i.saturating_sub(window_len);
        let history = &energy[start..i];
        let local_mean = history.iter().sum::<f64>() / history.len() as f64;
        onset[i] = (energy[i] - local_mean).max(0.0);
    }

    onset
}
