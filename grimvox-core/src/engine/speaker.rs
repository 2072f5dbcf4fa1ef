//! Reply production on the speaker thread: respond, synthesize, transform,
//! play. One request at a time; every request gets exactly one
//! [`SpeakDone`] back.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use super::pipeline::PipelineDiagnostics;
use super::{EngineConfig, EngineShared};
use crate::audio::{PlaybackDevice, PlaybackFactory};
use crate::collab::{Responder, Synthesizer};
use crate::effects::EffectChain;
use crate::envelope::LedDriver;
use crate::error::Result;
use crate::events::EngineStatus;
use crate::playback::{play_with_envelope, PlaybackOutcome};

pub(crate) enum SpeakRequest {
    /// Run the question through the responder, then speak the answer.
    Answer(String),
    /// Speak fixed text.
    Prompt(String),
}

pub(crate) struct SpeakDone {
    /// `None` when a collaborator or the device failed.
    pub outcome: Option<PlaybackOutcome>,
}

pub(crate) struct Speaker {
    responder: Box<dyn Responder>,
    synthesizer: Box<dyn Synthesizer>,
    chain: EffectChain,
    led: LedDriver,
    playback: PlaybackFactory,
    device: Option<Box<dyn PlaybackDevice>>,
    poll: std::time::Duration,
    shared: Arc<EngineShared>,
}

impl Speaker {
    pub fn new(
        responder: Box<dyn Responder>,
        synthesizer: Box<dyn Synthesizer>,
        chain: EffectChain,
        led: LedDriver,
        playback: PlaybackFactory,
        config: &EngineConfig,
        shared: Arc<EngineShared>,
    ) -> Self {
        Self {
            responder,
            synthesizer,
            chain,
            led,
            playback,
            device: None,
            poll: config.poll_interval(),
            shared,
        }
    }

    /// Serve requests until the listener drops its sender.
    pub fn run(
        mut self,
        requests: Receiver<SpeakRequest>,
        done: Sender<SpeakDone>,
    ) -> (Box<dyn Responder>, Box<dyn Synthesizer>) {
        self.led.rest();
        for request in requests.iter() {
            let outcome = match self.serve(request) {
                Ok(outcome) => {
                    let counter = match outcome {
                        PlaybackOutcome::Completed => &self.shared.diagnostics.replies_completed,
                        PlaybackOutcome::Interrupted => {
                            &self.shared.diagnostics.replies_interrupted
                        }
                    };
                    PipelineDiagnostics::bump(counter);
                    Some(outcome)
                }
                Err(e) => {
                    PipelineDiagnostics::bump(&self.shared.diagnostics.collaborator_errors);
                    warn!(error = %e, "reply abandoned");
                    // A failed device is reopened on the next request.
                    self.device = None;
                    None
                }
            };
            self.led.rest();
            if done.send(SpeakDone { outcome }).is_err() {
                break;
            }
        }
        self.device = None;
        debug!("speaker exiting");
        (self.responder, self.synthesizer)
    }

    fn serve(&mut self, request: SpeakRequest) -> Result<PlaybackOutcome> {
        let text = match request {
            SpeakRequest::Answer(question) => {
                let started = Instant::now();
                let answer = self.responder.respond(&question)?;
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    chars = answer.len(),
                    "response ready"
                );
                answer
            }
            SpeakRequest::Prompt(text) => text,
        };

        let voice = self.synthesizer.synthesize(&text)?;
        self.chain.reset();
        let started = Instant::now();
        let audio = self.chain.process(&voice);
        debug!(
            voice = self.synthesizer.name(),
            secs = audio.duration_secs(),
            fx_ms = started.elapsed().as_millis() as u64,
            "reply rendered"
        );

        if !self.shared.is_running() {
            return Ok(PlaybackOutcome::Interrupted);
        }
        let device = match self.device.take() {
            Some(device) => device,
            None => (self.playback)()?,
        };
        let device = self.device.insert(device);

        self.shared.set_status(EngineStatus::Speaking, None);
        play_with_envelope(
            device.as_mut(),
            &audio,
            &mut self.led,
            &self.shared.stop_playback,
            self.poll,
        )
    }
}
