//! Offline collaborators.
//!
//! Enough to run the full listen → answer → speak cycle on an appliance with
//! no speech backends installed: wake comes from the amplitude trigger, the
//! answer echoes the question and the voice is a WAV file or a tone.

use std::path::PathBuf;

use tracing::debug;

use super::{Responder, Synthesizer, Transcriber, Transcript};
use crate::audio::read_wav;
use crate::buffering::AudioBuffer;
use crate::error::Result;

/// Recognises nothing. Pair with the amplitude wake source.
#[derive(Debug, Default)]
pub struct SilentTranscriber {
    calls: u64,
}

impl Transcriber for SilentTranscriber {
    fn transcribe(&mut self, audio: &AudioBuffer) -> Result<Transcript> {
        self.calls += 1;
        debug!(
            call = self.calls,
            samples = audio.len(),
            sample_rate = audio.sample_rate,
            "silent transcriber"
        );
        Ok(Transcript::new("", 0.0))
    }
}

/// Answers by repeating the question back.
#[derive(Debug, Clone)]
pub struct EchoResponder {
    prefix: String,
}

impl EchoResponder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for EchoResponder {
    fn default() -> Self {
        Self::new("You asked")
    }
}

impl Responder for EchoResponder {
    fn respond(&mut self, question: &str) -> Result<String> {
        Ok(format!("{}: {}", self.prefix, question.trim()))
    }
}

/// Speaks the same WAV file whatever the text.
#[derive(Debug, Clone)]
pub struct WavSynthesizer {
    path: PathBuf,
}

impl WavSynthesizer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Synthesizer for WavSynthesizer {
    fn name(&self) -> &str {
        "wav"
    }

    fn synthesize(&mut self, _text: &str) -> Result<AudioBuffer> {
        read_wav(&self.path)
    }
}

/// A decaying two-partial tone, 60 ms per character, capped at 4 s.
#[derive(Debug, Clone)]
pub struct ToneSynthesizer {
    sample_rate: u32,
}

impl ToneSynthesizer {
    const SECS_PER_CHAR: f32 = 0.06;
    const MAX_SECS: f32 = 4.0;

    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl Synthesizer for ToneSynthesizer {
    fn name(&self) -> &str {
        "tone"
    }

    fn synthesize(&mut self, text: &str) -> Result<AudioBuffer> {
        let secs = (text.chars().count() as f32 * Self::SECS_PER_CHAR).min(Self::MAX_SECS);
        let n = (secs * self.sample_rate as f32).round() as usize;
        let rate = self.sample_rate as f32;
        let samples = (0..n)
            .map(|i| {
                let t = i as f32 / rate;
                let env = (-(t % 0.5) * 4.0).exp();
                let w = 2.0 * std::f32::consts::PI * t;
                0.4 * env * ((110.0 * w).sin() + 0.3 * (220.0 * w).sin())
            })
            .collect();
        Ok(AudioBuffer::new(samples, self.sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::write_wav;

    #[test]
    fn echo_repeats_question() {
        let mut r = EchoResponder::default();
        assert_eq!(
            r.respond(" what is the hour ").expect("respond"),
            "You asked: what is the hour"
        );
    }

    #[test]
    fn tone_length_tracks_text() {
        let mut s = ToneSynthesizer::new(16_000);
        assert_eq!(s.synthesize("abcde").expect("tone").len(), 4_800);
        assert!(s.synthesize("").expect("tone").is_empty());
        let long = "x".repeat(500);
        assert_eq!(s.synthesize(&long).expect("tone").len(), 64_000);
    }

    #[test]
    fn wav_synthesizer_reads_file() {
        let path = std::env::temp_dir().join(format!("grimvox-stub-{}.wav", std::process::id()));
        write_wav(&path, &AudioBuffer::new(vec![0.25; 800], 22_050)).expect("write");
        let mut s = WavSynthesizer::new(&path);
        let audio = s.synthesize("ignored").expect("read");
        let _ = std::fs::remove_file(&path);
        assert_eq!(audio.len(), 800);
        assert_eq!(audio.sample_rate, 22_050);

        let mut missing = WavSynthesizer::new("/nonexistent/grimvox.wav");
        assert!(missing.synthesize("x").is_err());
    }

    #[test]
    fn silent_transcriber_returns_empty() {
        let mut t = SilentTranscriber::default();
        let out = t
            .transcribe(&AudioBuffer::silent(160, 16_000))
            .expect("transcribe");
        assert!(out.text.is_empty());
    }
}
