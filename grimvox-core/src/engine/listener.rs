//! Per-frame conversation state machine on the pipeline thread.
//!
//! ```text
//! Wake ──confirmed, question in breath──────────────► Speaking{FollowUp}
//!   │  ──confirmed──► Question ──finalized──────────► Speaking{FollowUp}
//!   │                     └────nothing usable──► prompt ─► Speaking{FollowUp}
//!   │
//! Speaking{then} ──completed──► FollowUp (or Wake)
//!                ──interrupted / failed──► Wake
//! FollowUp ──finalized──► Speaking{FollowUp}
//!          ──silence / stop phrase / ≤ 2 chars──► Wake
//! ```
//!
//! Replies are produced on the speaker thread. While one plays the listener
//! keeps consuming frames and runs the stop check on anything loud enough to
//! be the user talking over it.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use tracing::{debug, error, info, info_span, warn};

use super::pipeline::PipelineDiagnostics;
use super::speaker::{SpeakDone, SpeakRequest};
use super::{EngineConfig, EngineShared};
use crate::buffering::AudioBuffer;
use crate::collab::{Transcriber, Transcript};
use crate::events::{ActivityEvent, EngineStatus, TranscriptEvent, TranscriptKind, WakeEvent};
use crate::playback::PlaybackOutcome;
use crate::segment::{SegmentOutcome, SegmentRecorder};
use crate::vad::{EnergyVad, FrameVerdict, VoiceActivityDetector};
use crate::wake::{
    extract_question, AmplitudeTrigger, PhraseMatcher, WakeConfirmation, WakeSource,
};

/// One activity event per this many frames (100 ms at 20 ms frames).
const ACTIVITY_EVERY: u64 = 5;

/// Transcripts this short or shorter end the conversation.
const MIN_QUESTION_CHARS: usize = 2;

/// Where to go once the current reply has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Then {
    FollowUp,
    Wake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Wake,
    Question,
    FollowUp,
    Speaking { then: Then },
}

pub(crate) struct Listener {
    shared: Arc<EngineShared>,
    sample_rate: u32,
    vad: Box<dyn VoiceActivityDetector>,
    wake: WakeConfirmation,
    wake_source: WakeSource,
    wake_phrases: PhraseMatcher,
    stop_phrases: PhraseMatcher,
    amplitude: AmplitudeTrigger,
    follow_up_prompt: String,
    /// Loudness a frame needs during playback to count as barge-in.
    stop_check_rms: f32,
    /// Seconds of audio the VAD needs before it reports an onset.
    onset_secs: f32,
    frame_secs: f32,

    utterance: SegmentRecorder,
    question: SegmentRecorder,
    follow_up: SegmentRecorder,
    stop_check: SegmentRecorder,

    transcriber: Box<dyn Transcriber>,
    speak_tx: Sender<SpeakRequest>,
    done_rx: Receiver<SpeakDone>,

    phase: Phase,
    frames: u64,
    stop_heard: bool,
}

impl Listener {
    pub fn new(
        config: &EngineConfig,
        transcriber: Box<dyn Transcriber>,
        speak_tx: Sender<SpeakRequest>,
        done_rx: Receiver<SpeakDone>,
        shared: Arc<EngineShared>,
    ) -> Self {
        let rate = config.sample_rate;
        let frame_secs = config.frame_ms as f32 / 1_000.0;
        Self {
            shared,
            sample_rate: rate,
            vad: Box::new(EnergyVad::new(config.vad.clone())),
            wake: WakeConfirmation::new(
                config.wake.confirm_threshold,
                std::time::Duration::from_millis(config.wake.debounce_ms),
            ),
            wake_source: config.wake.source,
            wake_phrases: PhraseMatcher::new(&config.wake.phrases),
            stop_phrases: PhraseMatcher::commands(&config.wake.stop_phrases),
            amplitude: AmplitudeTrigger::new(
                config.wake.amplitude_threshold,
                config.wake.amplitude_window_secs,
            ),
            follow_up_prompt: config.wake.follow_up_prompt.clone(),
            stop_check_rms: config.vad.speech_threshold * config.stop_check_factor,
            onset_secs: config.vad.min_speech_frames as f32 * frame_secs,
            frame_secs,
            utterance: SegmentRecorder::new(config.wake_utterance.clone(), rate),
            question: SegmentRecorder::new(config.question.clone(), rate),
            follow_up: SegmentRecorder::new(config.follow_up.clone(), rate),
            stop_check: SegmentRecorder::new(config.wake_utterance.clone(), rate),
            transcriber,
            speak_tx,
            done_rx,
            phase: Phase::Wake,
            frames: 0,
            stop_heard: false,
        }
    }

    /// Handle one frame. The frame is already in the shared ring.
    pub fn on_frame(&mut self, frame: &[f32]) {
        let was_speech = self.vad.state().is_speech();
        let verdict = self.vad.classify(frame);
        if verdict.state.is_speech() {
            PipelineDiagnostics::bump(&self.shared.diagnostics.vad_speech_frames);
        }

        self.frames += 1;
        if self.frames % ACTIVITY_EVERY == 0 {
            let _ = self.shared.activity_tx.send(ActivityEvent {
                seq: self.shared.next_seq(),
                rms: verdict.rms,
                vad: verdict.state,
            });
        }

        match self.phase {
            Phase::Wake => self.listen_for_wake(frame, verdict, was_speech),
            Phase::Question => self.record(frame, verdict, TranscriptKind::Question),
            Phase::FollowUp => self.record(frame, verdict, TranscriptKind::FollowUp),
            Phase::Speaking { then } => self.while_speaking(frame, verdict, then),
        }
    }

    pub fn shutdown(&mut self) {
        self.utterance.abort();
        self.question.abort();
        self.follow_up.abort();
        self.stop_check.abort();
        debug!(phase = ?self.phase, frames = self.frames, "listener shut down");
    }

    pub fn into_transcriber(self) -> Box<dyn Transcriber> {
        self.transcriber
    }

    fn listen_for_wake(&mut self, frame: &[f32], verdict: FrameVerdict, was_speech: bool) {
        match self.wake_source {
            WakeSource::Amplitude => {
                if verdict.state.is_speech() {
                    let hit = self.amplitude.check(&self.shared.ring);
                    if self.wake.observe(hit) {
                        self.on_wake(None, None);
                    }
                }
            }
            WakeSource::Transcript => {
                if !self.utterance.is_recording() {
                    if verdict.state.is_speech() && !was_speech {
                        // The ring already holds the frames that got the VAD
                        // over its onset run, this one included.
                        let secs = self.utterance.config().pre_roll_secs + self.onset_secs;
                        let pre_roll = self.shared.ring.read_latest(secs);
                        self.utterance.begin_with_speech(&pre_roll);
                    }
                    return;
                }
                let outcome = self.utterance.push(frame, verdict.voiced);
                if outcome.is_terminal() {
                    // The next utterance starts on a fresh Silence→Speech edge,
                    // even if noise in the dead band would hold Speech forever.
                    self.vad.reset();
                }
                match outcome {
                    SegmentOutcome::Continue => {}
                    SegmentOutcome::Discarded(reason) => {
                        PipelineDiagnostics::bump(&self.shared.diagnostics.segments_discarded);
                        debug!(?reason, "wake utterance discarded");
                    }
                    SegmentOutcome::Finalized(segment) => {
                        PipelineDiagnostics::bump(&self.shared.diagnostics.segments_finalized);
                        self.check_wake_utterance(&segment.audio);
                    }
                }
            }
        }
    }

    fn check_wake_utterance(&mut self, audio: &AudioBuffer) {
        let Some(transcript) = self.transcribe(audio, TranscriptKind::Wake) else {
            return;
        };
        let phrase = self
            .wake_phrases
            .find(&transcript.normalized())
            .map(str::to_owned);
        if self.wake.observe(phrase.is_some()) {
            let question = phrase
                .as_deref()
                .and_then(|p| extract_question(&transcript.text, p));
            self.on_wake(phrase, question);
        }
    }

    fn on_wake(&mut self, phrase: Option<String>, question: Option<String>) {
        PipelineDiagnostics::bump(&self.shared.diagnostics.wake_confirmations);
        info!(phrase = ?phrase, question = ?question, "wake confirmed");
        let _ = self.shared.wake_tx.send(WakeEvent {
            seq: self.shared.next_seq(),
            phrase,
            question: question.clone(),
        });
        self.utterance.abort();

        match question {
            Some(q) => self.request(SpeakRequest::Answer(q), Then::FollowUp),
            None => {
                let pre_roll = self
                    .shared
                    .ring
                    .read_latest(self.question.config().pre_roll_secs);
                self.question.begin(&pre_roll);
                self.phase = Phase::Question;
                self.shared.set_status(EngineStatus::Recording, None);
            }
        }
    }

    fn record(&mut self, frame: &[f32], verdict: FrameVerdict, kind: TranscriptKind) {
        let recorder = match kind {
            TranscriptKind::Question => &mut self.question,
            _ => &mut self.follow_up,
        };
        let segment = match recorder.push(frame, verdict.voiced) {
            SegmentOutcome::Continue => return,
            SegmentOutcome::Discarded(reason) => {
                PipelineDiagnostics::bump(&self.shared.diagnostics.segments_discarded);
                info!(?kind, ?reason, "nothing heard");
                self.nothing_usable(kind);
                return;
            }
            SegmentOutcome::Finalized(segment) => segment,
        };
        PipelineDiagnostics::bump(&self.shared.diagnostics.segments_finalized);

        let span = info_span!(
            "utterance",
            ?kind,
            secs = segment.total_duration_secs,
            forced = segment.forced
        );
        let _enter = span.enter();
        self.shared.set_status(EngineStatus::Thinking, None);

        let Some(transcript) = self.transcribe(&segment.audio, kind) else {
            self.enter_wake();
            return;
        };
        if self.stop_phrases.matches(&transcript.normalized()) {
            info!("stop phrase heard, conversation ended");
            self.enter_wake();
            return;
        }
        let text = transcript.text.trim();
        if text.chars().count() <= MIN_QUESTION_CHARS {
            debug!(text, "transcript too short");
            self.nothing_usable(kind);
            return;
        }
        self.request(SpeakRequest::Answer(text.to_owned()), Then::FollowUp);
    }

    /// A question that never came gets the prompt; a follow-up that never
    /// came ends the conversation.
    fn nothing_usable(&mut self, kind: TranscriptKind) {
        match kind {
            TranscriptKind::Question => {
                let prompt = self.follow_up_prompt.clone();
                self.request(SpeakRequest::Prompt(prompt), Then::FollowUp);
            }
            _ => self.enter_wake(),
        }
    }

    fn request(&mut self, request: SpeakRequest, then: Then) {
        self.shared.stop_playback.store(false, Ordering::Release);
        self.stop_heard = false;
        self.stop_check.abort();
        self.shared.set_status(EngineStatus::Thinking, None);

        match self.speak_tx.try_send(request) {
            Ok(()) => self.phase = Phase::Speaking { then },
            Err(TrySendError::Full(_)) => {
                warn!("speaker still busy, request dropped");
                self.enter_wake();
            }
            Err(TrySendError::Disconnected(_)) => {
                error!("speaker thread gone");
                self.enter_wake();
            }
        }
    }

    fn while_speaking(&mut self, frame: &[f32], verdict: FrameVerdict, then: Then) {
        match self.done_rx.try_recv() {
            Ok(done) => {
                self.stop_check.abort();
                let next = match done.outcome {
                    Some(PlaybackOutcome::Completed) if !self.stop_heard => then,
                    _ => Then::Wake,
                };
                match next {
                    Then::FollowUp => {
                        let pre_roll = self
                            .shared
                            .ring
                            .read_latest(self.follow_up.config().pre_roll_secs);
                        self.follow_up.begin(&pre_roll);
                        self.phase = Phase::FollowUp;
                        self.shared.set_status(EngineStatus::Recording, None);
                    }
                    Then::Wake => self.enter_wake(),
                }
                return;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                error!("speaker thread gone");
                self.enter_wake();
                return;
            }
        }

        if self.stop_heard {
            return;
        }
        let loud = verdict.rms >= self.stop_check_rms;
        if !self.stop_check.is_recording() {
            if loud {
                let pre_roll = self.shared.ring.read_latest(self.frame_secs);
                self.stop_check.begin_with_speech(&pre_roll);
            }
            return;
        }
        if let SegmentOutcome::Finalized(segment) = self.stop_check.push(frame, loud) {
            let Some(transcript) = self.transcribe(&segment.audio, TranscriptKind::StopCheck)
            else {
                return;
            };
            if self.stop_phrases.matches(&transcript.normalized()) {
                info!("stop phrase heard during playback");
                self.stop_heard = true;
                self.shared.stop_playback.store(true, Ordering::Release);
            }
        }
    }

    fn enter_wake(&mut self) {
        self.utterance.abort();
        self.question.abort();
        self.follow_up.abort();
        self.stop_check.abort();
        self.vad.reset();
        self.phase = Phase::Wake;
        self.shared.set_status(EngineStatus::Listening, None);
    }

    fn transcribe(&mut self, audio: &AudioBuffer, kind: TranscriptKind) -> Option<Transcript> {
        PipelineDiagnostics::bump(&self.shared.diagnostics.transcriptions);
        let started = Instant::now();
        match self.transcriber.transcribe(audio) {
            Ok(transcript) => {
                debug!(
                    ?kind,
                    text = %transcript.text,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    sample_rate = self.sample_rate,
                    "transcribed"
                );
                let _ = self.shared.transcript_tx.send(TranscriptEvent {
                    seq: self.shared.next_seq(),
                    kind,
                    text: transcript.text.clone(),
                    confidence: transcript.confidence,
                    duration_secs: audio.duration_secs(),
                });
                Some(transcript)
            }
            Err(e) => {
                PipelineDiagnostics::bump(&self.shared.diagnostics.transcription_errors);
                warn!(?kind, error = %e, "transcription failed");
                None
            }
        }
    }
}
