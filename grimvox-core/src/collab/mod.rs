//! External collaborators: speech-to-text, response generation and
//! text-to-speech.
//!
//! The engine only talks to these traits. A collaborator signals failure
//! with an `Err`, on which the current conversation cycle is abandoned and
//! the engine returns to listening.
//!
//! `&mut self` everywhere: real backends keep decoder state or HTTP clients
//! and are owned by exactly one engine thread.

pub mod stub;

pub use stub::{EchoResponder, SilentTranscriber, ToneSynthesizer, WavSynthesizer};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::buffering::AudioBuffer;
use crate::error::{GrimvoxError, Result};

/// Text recognised in one buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub text: String,
    /// In [0, 1]; backends without a score report 1.0.
    pub confidence: f32,
}

impl Transcript {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }

    /// Lower-cased and trimmed, ready for phrase matching.
    pub fn normalized(&self) -> String {
        self.text.trim().to_lowercase()
    }
}

pub trait Transcriber: Send + 'static {
    fn transcribe(&mut self, audio: &AudioBuffer) -> Result<Transcript>;
}

pub trait Responder: Send + 'static {
    fn respond(&mut self, question: &str) -> Result<String>;
}

pub trait Synthesizer: Send + 'static {
    fn name(&self) -> &str;

    fn synthesize(&mut self, text: &str) -> Result<AudioBuffer>;
}

/// Ordered synthesizers tried until one produces audio.
pub struct FallbackSynthesizer {
    providers: Vec<Box<dyn Synthesizer>>,
    last_used: Option<usize>,
}

impl FallbackSynthesizer {
    pub fn new(providers: Vec<Box<dyn Synthesizer>>) -> Self {
        Self {
            providers,
            last_used: None,
        }
    }

    pub fn push(&mut self, provider: Box<dyn Synthesizer>) {
        self.providers.push(provider);
    }

    /// Name of the provider that produced the most recent utterance.
    pub fn current_provider(&self) -> Option<&str> {
        self.last_used
            .and_then(|i| self.providers.get(i))
            .map(|p| p.name())
    }
}

impl Synthesizer for FallbackSynthesizer {
    fn name(&self) -> &str {
        "fallback"
    }

    fn synthesize(&mut self, text: &str) -> Result<AudioBuffer> {
        for (idx, provider) in self.providers.iter_mut().enumerate() {
            match provider.synthesize(text) {
                Ok(audio) if !audio.is_empty() => {
                    if self.last_used != Some(idx) {
                        info!(provider = provider.name(), "speech synthesizer selected");
                    }
                    self.last_used = Some(idx);
                    return Ok(audio);
                }
                Ok(_) => warn!(provider = provider.name(), "synthesizer returned no audio"),
                Err(e) => warn!(provider = provider.name(), error = %e, "synthesizer failed, trying next"),
            }
        }
        Err(GrimvoxError::Collaborator(format!(
            "all {} synthesizers failed",
            self.providers.len()
        )))
    }
}

/// The three collaborators an engine needs.
pub struct Collaborators {
    pub transcriber: Box<dyn Transcriber>,
    pub responder: Box<dyn Responder>,
    pub synthesizer: Box<dyn Synthesizer>,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl Synthesizer for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn synthesize(&mut self, _text: &str) -> Result<AudioBuffer> {
            Err(GrimvoxError::Collaborator("offline".into()))
        }
    }

    struct Mute;

    impl Synthesizer for Mute {
        fn name(&self) -> &str {
            "mute"
        }
        fn synthesize(&mut self, _text: &str) -> Result<AudioBuffer> {
            Ok(AudioBuffer::new(Vec::new(), 16_000))
        }
    }

    #[test]
    fn first_working_provider_wins() {
        let mut synth = FallbackSynthesizer::new(vec![
            Box::new(Broken),
            Box::new(Mute),
            Box::new(ToneSynthesizer::new(16_000)),
            Box::new(Broken),
        ]);
        let audio = synth.synthesize("rise").expect("synthesize");
        assert!(!audio.is_empty());
        assert_eq!(synth.current_provider(), Some("tone"));
    }

    #[test]
    fn all_failing_is_an_error() {
        let mut synth = FallbackSynthesizer::new(vec![Box::new(Broken), Box::new(Mute)]);
        assert!(matches!(
            synth.synthesize("rise"),
            Err(GrimvoxError::Collaborator(_))
        ));
        assert_eq!(synth.current_provider(), None);

        let mut empty = FallbackSynthesizer::new(Vec::new());
        assert!(empty.synthesize("rise").is_err());
    }

    #[test]
    fn transcript_normalizes_for_matching() {
        let t = Transcript::new("  Dark One, WAKE  ", 0.8);
        assert_eq!(t.normalized(), "dark one, wake");
    }
}
