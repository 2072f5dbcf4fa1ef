//! Amplitude-only wake candidate source.

use crate::buffering::RingBuffer;

/// Raises a candidate when the RMS of the most recent window crosses a
/// threshold. Lightweight fallback for when no transcriber is available.
#[derive(Debug, Clone, Copy)]
pub struct AmplitudeTrigger {
    threshold: f32,
    window_secs: f32,
}

impl AmplitudeTrigger {
    pub fn new(threshold: f32, window_secs: f32) -> Self {
        Self {
            threshold,
            window_secs,
        }
    }

    pub fn check(&self, ring: &RingBuffer) -> bool {
        ring.rms_latest(self.window_secs) > self.threshold
    }

    pub fn check_samples(&self, samples: &[f32]) -> bool {
        crate::buffering::rms(samples) > self.threshold
    }
}
