//! Multi-tap feedback delay reverb.
//!
//! Four parallel delay lines at 30/60/90/120 ms. Each line is fed the input
//! scaled by `room_size` plus its own output scaled by `damping`; tap `j` is
//! read out at `1 − 0.1·j`. Line contents persist across calls so a long
//! reply processed in pieces stays continuous; [`EffectStage::reset`] clears
//! them between unrelated utterances.

use super::EffectStage;
use crate::error::Result;

const TAP_SECS: [f32; 4] = [0.030, 0.060, 0.090, 0.120];

#[derive(Debug, Clone)]
struct DelayLine {
    buf: Vec<f32>,
    pos: usize,
}

impl DelayLine {
    fn new(len: usize) -> Self {
        Self {
            buf: vec![0.0; len.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn tick(&mut self, input: f32, room_size: f32, damping: f32) -> f32 {
        let delayed = self.buf[self.pos];
        self.buf[self.pos] = input * room_size + delayed * damping;
        self.pos = (self.pos + 1) % self.buf.len();
        delayed
    }

    fn clear(&mut self) {
        self.buf.fill(0.0);
        self.pos = 0;
    }
}

#[derive(Debug, Clone)]
pub struct Reverb {
    room_size: f32,
    damping: f32,
    wet: f32,
    lines: Vec<DelayLine>,
    /// Sample rate the lines were sized for.
    line_rate: u32,
}

impl Reverb {
    pub fn new(room_size: f32, damping: f32, wet: f32) -> Self {
        Self {
            room_size,
            damping,
            wet,
            lines: Vec::new(),
            line_rate: 0,
        }
    }

    fn ensure_lines(&mut self, sample_rate: u32) {
        if self.line_rate == sample_rate && !self.lines.is_empty() {
            return;
        }
        self.lines = TAP_SECS
            .iter()
            .map(|&s| DelayLine::new((s * sample_rate as f32).round() as usize))
            .collect();
        self.line_rate = sample_rate;
    }
}

impl EffectStage for Reverb {
    fn name(&self) -> &'static str {
        "reverb"
    }

    fn process(&mut self, input: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
        self.ensure_lines(sample_rate);
        let dry = 1.0 - self.wet;
        let (room, damping, wet) = (self.room_size, self.damping, self.wet);

        let out = input
            .iter()
            .map(|&x| {
                let tail: f32 = self
                    .lines
                    .iter_mut()
                    .enumerate()
                    .map(|(j, line)| line.tick(x, room, damping) * (1.0 - 0.1 * j as f32))
                    .sum();
                x * dry + tail * wet
            })
            .collect();
        Ok(out)
    }

    fn reset(&mut self) {
        self.lines.iter_mut().for_each(DelayLine::clear);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse(n: usize) -> Vec<f32> {
        let mut v = vec![0.0; n];
        v[0] = 1.0;
        v
    }

    #[test]
    fn impulse_echoes_at_first_tap() {
        let mut rv = Reverb::new(1.0, 0.0, 1.0);
        let out = rv.process(&impulse(1_000), 1_000).expect("process");
        // 30 ms at 1 kHz = 30 samples, unit decay on the first tap.
        assert_eq!(out[0], 0.0);
        assert!((out[30] - 1.0).abs() < 1e-6);
        assert!((out[60] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn state_carries_over_between_calls() {
        let mut rv = Reverb::new(0.9, 0.2, 0.3);
        rv.process(&impulse(10), 1_000).expect("process");
        let tail = rv.process(&[0.0; 200], 1_000).expect("process");
        assert!(tail.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn reset_removes_bleed() {
        let mut rv = Reverb::new(0.9, 0.2, 0.3);
        let first = rv.process(&impulse(500), 1_000).expect("process");
        rv.reset();
        let second = rv.process(&impulse(500), 1_000).expect("process");
        assert_eq!(first, second);
    }

    #[test]
    fn dry_only_when_wet_is_zero() {
        let mut rv = Reverb::new(0.9, 0.2, 0.0);
        let input = [0.1, 0.2, -0.3];
        assert_eq!(rv.process(&input, 16_000).expect("process"), input.to_vec());
    }
}
