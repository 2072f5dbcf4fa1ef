//! Owned mono audio value passed between every stage of the front-end.

/// A contiguous block of mono PCM samples at a known sample rate.
///
/// Used for capture frames, recorded segments, synthesized replies and the
/// processed buffer handed to playback.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000, 22050, 48000).
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// `len` samples of digital silence.
    pub fn silent(len: usize, sample_rate: u32) -> Self {
        Self::new(vec![0.0; len], sample_rate)
    }

    /// Returns the duration of this buffer in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the buffer contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn rms(&self) -> f32 {
        rms(&self.samples)
    }

    pub fn peak(&self) -> f32 {
        peak(&self.samples)
    }
}

/// Root-mean-square of a sample slice. Empty input is silent.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Largest absolute sample value.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

/// Convert a duration to a sample count at `sample_rate`, rounding to nearest.
pub fn secs_to_samples(secs: f32, sample_rate: u32) -> usize {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    (secs as f64 * sample_rate as f64).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn duration_follows_sample_rate() {
        let buf = AudioBuffer::silent(8_000, 16_000);
        assert_abs_diff_eq!(buf.duration_secs(), 0.5);
        assert!(!buf.is_empty());
    }

    #[test]
    fn rms_of_square_wave() {
        let samples: Vec<f32> = (0..256)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        assert_abs_diff_eq!(rms(&samples), 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(peak(&samples), 0.5);
    }

    #[test]
    fn empty_slice_is_silent() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(peak(&[]), 0.0);
    }

    #[test]
    fn secs_to_samples_rejects_negative_and_nan() {
        assert_eq!(secs_to_samples(-1.0, 16_000), 0);
        assert_eq!(secs_to_samples(f32::NAN, 16_000), 0);
        assert_eq!(secs_to_samples(0.02, 16_000), 320);
    }
}
