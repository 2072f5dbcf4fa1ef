//! `Orchestrator`: top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! Orchestrator::new()   → config validated, status = Idle
//!     └─► start()       → capture open, pipeline + speaker threads running, status = Listening
//!         └─► stop()    → both threads joined, collaborators recovered, status = Stopped
//! ```
//!
//! `start()`/`stop()` in the wrong state return an error rather than
//! panicking, and a stopped orchestrator can be started again.
//!
//! ## Threading
//!
//! ```text
//! cpal callback ─SPSC─► pipeline thread ──────────────► speaker thread
//!                       resample → RingBuffer          respond → synthesize
//!                       VAD → wake → segments          → EffectChain → playback
//!                       transcribe, stop-check         └─ scoped LED loop
//! ```
//!
//! cpal streams are `!Send`, so each device is opened by its factory on the
//! thread that uses it. A sync channel carries the capture open result back
//! to `start()`.

mod listener;
pub mod pipeline;
mod speaker;

pub use pipeline::{DiagnosticsSnapshot, PipelineDiagnostics};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::{
    audio::{cpal_capture, cpal_playback, CaptureFactory, CaptureFlags, PlaybackFactory},
    buffering::{create_capture_ring, AudioBuffer, RingBuffer},
    collab::{Collaborators, Responder, Synthesizer, Transcriber},
    effects::{EffectChain, EffectChainConfig},
    envelope::{LedConfig, LedDriver, PwmConfig},
    error::{GrimvoxError, Result},
    events::{ActivityEvent, EngineStatus, EngineStatusEvent, TranscriptEvent, WakeEvent},
    segment::SegmentConfig,
    vad::VadConfig,
    wake::WakeConfig,
};

use listener::Listener;
use speaker::{SpeakDone, SpeakRequest, Speaker};

/// Broadcast channel capacity per event type.
const BROADCAST_CAP: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Rate everything downstream of capture runs at.
    pub sample_rate: u32,
    /// VAD frame length.
    pub frame_ms: u32,
    /// Capture history kept for pre-roll and the amplitude trigger.
    pub ring_secs: f32,
    pub vad: VadConfig,
    pub wake: WakeConfig,
    /// End-pointing for the question after a wake.
    pub question: SegmentConfig,
    /// End-pointing for follow-ups after a reply.
    pub follow_up: SegmentConfig,
    /// End-pointing for wake utterances and stop checks.
    pub wake_utterance: SegmentConfig,
    pub effects: EffectChainConfig,
    pub led: LedConfig,
    pub pwm: PwmConfig,
    pub preferred_input_device: Option<String>,
    /// During playback a frame must reach `speech_threshold × this` to count
    /// as the user talking over the reply.
    pub stop_check_factor: f32,
    /// Stop-flag poll period during playback.
    pub poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_ms: 20,
            ring_secs: 10.0,
            vad: VadConfig::default(),
            wake: WakeConfig::default(),
            question: SegmentConfig::question(),
            follow_up: SegmentConfig::follow_up(),
            wake_utterance: SegmentConfig::wake_utterance(),
            effects: EffectChainConfig::default(),
            led: LedConfig::default(),
            pwm: PwmConfig::default(),
            preferred_input_device: None,
            stop_check_factor: 2.0,
            poll_interval_ms: 100,
        }
    }
}

impl EngineConfig {
    /// Samples per VAD frame.
    pub fn frame_len(&self) -> usize {
        (self.sample_rate as usize * self.frame_ms as usize / 1_000).max(1)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate < 8_000 {
            return Err(GrimvoxError::InvalidConfig(format!(
                "sample_rate must be at least 8000, got {}",
                self.sample_rate
            )));
        }
        if !(5..=100).contains(&self.frame_ms) {
            return Err(GrimvoxError::InvalidConfig(format!(
                "frame_ms must be in [5, 100], got {}",
                self.frame_ms
            )));
        }
        let history_needed = [
            self.wake.amplitude_window_secs,
            self.question.pre_roll_secs,
            self.follow_up.pre_roll_secs,
            self.wake_utterance.pre_roll_secs,
        ]
        .into_iter()
        .fold(0.0f32, f32::max);
        if !(self.ring_secs.is_finite() && self.ring_secs >= history_needed && self.ring_secs > 0.0)
        {
            return Err(GrimvoxError::InvalidConfig(format!(
                "ring_secs {} is shorter than the {history_needed}s of history the listener reads",
                self.ring_secs
            )));
        }
        if !(self.stop_check_factor.is_finite() && self.stop_check_factor >= 1.0) {
            return Err(GrimvoxError::InvalidConfig(format!(
                "stop_check_factor must be ≥ 1, got {}",
                self.stop_check_factor
            )));
        }
        if self.pwm.frequency_hz == 0 {
            return Err(GrimvoxError::InvalidConfig(
                "pwm frequency_hz must be non-zero".into(),
            ));
        }
        self.vad.validate()?;
        self.wake.validate()?;
        self.question.validate()?;
        self.follow_up.validate()?;
        self.wake_utterance.validate()?;
        self.effects.validate()?;
        self.led.validate()
    }
}

/// Builds the LED driver on the speaker thread.
pub type LedFactory = Arc<dyn Fn(&LedConfig, &PwmConfig) -> LedDriver + Send + Sync>;

/// Device factories handed to the orchestrator.
#[derive(Clone)]
pub struct Devices {
    pub capture: CaptureFactory,
    pub playback: PlaybackFactory,
    pub led: LedFactory,
}

impl Devices {
    /// cpal input/output and the sysfs PWM LED.
    pub fn system(preferred_input: Option<String>) -> Self {
        Self {
            capture: cpal_capture(preferred_input),
            playback: cpal_playback(),
            led: Arc::new(|led: &LedConfig, pwm: &PwmConfig| {
                if pwm.enabled {
                    LedDriver::from_pwm(led.clone(), pwm)
                } else {
                    LedDriver::disabled(led.clone())
                }
            }),
        }
    }
}

/// State shared by the orchestrator handle and its two threads.
pub(crate) struct EngineShared {
    pub running: AtomicBool,
    /// Raised to cut the current reply short.
    pub stop_playback: AtomicBool,
    pub status: Mutex<EngineStatus>,
    pub ring: RingBuffer,
    pub seq: AtomicU64,
    pub diagnostics: PipelineDiagnostics,
    pub status_tx: broadcast::Sender<EngineStatusEvent>,
    pub transcript_tx: broadcast::Sender<TranscriptEvent>,
    pub wake_tx: broadcast::Sender<WakeEvent>,
    pub activity_tx: broadcast::Sender<ActivityEvent>,
}

impl EngineShared {
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Store and broadcast `status` if it differs from the current one.
    pub fn set_status(&self, status: EngineStatus, detail: Option<String>) {
        {
            let mut current = self.status.lock();
            if *current == status && detail.is_none() {
                return;
            }
            *current = status;
        }
        let _ = self.status_tx.send(EngineStatusEvent { status, detail });
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

struct Workers {
    pipeline: JoinHandle<Box<dyn Transcriber>>,
    speaker: JoinHandle<(Box<dyn Responder>, Box<dyn Synthesizer>)>,
}

/// Owns the voice cycle: capture, wake, question, reply, follow-ups.
///
/// `Send + Sync`; wrap in `Arc` to share with event-forwarding tasks.
pub struct Orchestrator {
    config: EngineConfig,
    devices: Devices,
    shared: Arc<EngineShared>,
    /// Present while stopped; moved into the threads while running.
    collaborators: Mutex<Option<Collaborators>>,
    workers: Mutex<Option<Workers>>,
}

impl Orchestrator {
    pub fn new(config: EngineConfig, collaborators: Collaborators, devices: Devices) -> Result<Self> {
        config.validate()?;
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (transcript_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (wake_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (activity_tx, _) = broadcast::channel(BROADCAST_CAP);

        let shared = Arc::new(EngineShared {
            running: AtomicBool::new(false),
            stop_playback: AtomicBool::new(false),
            status: Mutex::new(EngineStatus::Idle),
            ring: RingBuffer::new(config.ring_secs, config.sample_rate),
            seq: AtomicU64::new(0),
            diagnostics: PipelineDiagnostics::default(),
            status_tx,
            transcript_tx,
            wake_tx,
            activity_tx,
        });

        Ok(Self {
            config,
            devices,
            shared,
            collaborators: Mutex::new(Some(collaborators)),
            workers: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open capture and start the pipeline and speaker threads.
    ///
    /// Blocks until the input device is confirmed open or has failed.
    ///
    /// # Errors
    /// - `GrimvoxError::AlreadyRunning` if already started.
    /// - Device errors from the capture factory.
    pub fn start(&self) -> Result<()> {
        let mut workers = self.workers.lock();
        if workers.is_some() || self.shared.is_running() {
            return Err(GrimvoxError::AlreadyRunning);
        }
        let chain = EffectChain::from_config(&self.config.effects)?;
        let Collaborators {
            transcriber,
            responder,
            synthesizer,
        } = self.collaborators.lock().take().ok_or_else(|| {
            GrimvoxError::Other(anyhow::anyhow!(
                "collaborators were lost by a previous run"
            ))
        })?;

        self.shared.diagnostics.reset();
        self.shared.stop_playback.store(false, Ordering::Release);
        self.shared.running.store(true, Ordering::Release);

        let (speak_tx, speak_rx) = crossbeam_channel::bounded::<SpeakRequest>(1);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<SpeakDone>(1);

        let speaker = {
            let config = self.config.clone();
            let playback = self.devices.playback.clone();
            let led = self.devices.led.clone();
            let shared = Arc::clone(&self.shared);
            thread::Builder::new()
                .name("grimvox-speaker".into())
                .spawn(move || {
                    let led = led(&config.led, &config.pwm);
                    Speaker::new(responder, synthesizer, chain, led, playback, &config, shared)
                        .run(speak_rx, done_tx)
                })
        };
        let speaker = match speaker {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                return Err(GrimvoxError::Io(e));
            }
        };

        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();
        let config = self.config.clone();
        let shared = Arc::clone(&self.shared);
        let capture_factory = self.devices.capture.clone();

        let pipeline = thread::Builder::new()
            .name("grimvox-pipeline".into())
            .spawn(move || {
                let (producer, consumer) = create_capture_ring();
                let flags = CaptureFlags::new(Arc::new(AtomicBool::new(true)));
                let capture = match capture_factory(producer, flags.clone()) {
                    Ok(c) => {
                        let _ = open_tx.send(Ok(c.sample_rate()));
                        c
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return transcriber;
                    }
                };

                let listener =
                    Listener::new(&config, transcriber, speak_tx, done_rx, Arc::clone(&shared));
                let transcriber = pipeline::run(pipeline::PipelineContext {
                    frame_len: config.frame_len(),
                    target_rate: config.sample_rate,
                    capture_rate: capture.sample_rate(),
                    consumer,
                    flags,
                    listener,
                    shared,
                });
                // Stream drops here, releasing the device on this thread.
                drop(capture);
                transcriber
            });
        let pipeline = match pipeline {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                // speak_tx went down with the closure, so the speaker exits.
                self.recover(None, Some(speaker));
                return Err(GrimvoxError::Io(e));
            }
        };

        match open_rx.recv() {
            Ok(Ok(rate)) => {
                *workers = Some(Workers { pipeline, speaker });
                self.shared.set_status(EngineStatus::Listening, None);
                info!(capture_rate = rate, target_rate = self.config.sample_rate, "engine started");
                Ok(())
            }
            Ok(Err(e)) => {
                self.shared.running.store(false, Ordering::Release);
                self.recover(Some(pipeline), Some(speaker));
                self.shared.set_status(EngineStatus::Error, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                self.shared.running.store(false, Ordering::Release);
                self.recover(Some(pipeline), Some(speaker));
                self.shared
                    .set_status(EngineStatus::Error, Some("pipeline failed to start".into()));
                Err(GrimvoxError::Other(anyhow::anyhow!(
                    "pipeline thread died unexpectedly"
                )))
            }
        }
    }

    /// Stop capture, cut any reply short and join both threads.
    ///
    /// # Errors
    /// - `GrimvoxError::NotRunning` if not started.
    pub fn stop(&self) -> Result<()> {
        let Some(Workers { pipeline, speaker }) = self.workers.lock().take() else {
            return Err(GrimvoxError::NotRunning);
        };
        info!("engine stop requested");
        self.shared.running.store(false, Ordering::Release);
        self.shared.stop_playback.store(true, Ordering::Release);
        self.recover(Some(pipeline), Some(speaker));
        self.shared.set_status(EngineStatus::Stopped, None);
        Ok(())
    }

    /// Join whichever threads exist and put their collaborators back.
    fn recover(
        &self,
        pipeline: Option<JoinHandle<Box<dyn Transcriber>>>,
        speaker: Option<JoinHandle<(Box<dyn Responder>, Box<dyn Synthesizer>)>>,
    ) {
        let transcriber = pipeline.and_then(|h| match h.join() {
            Ok(t) => Some(t),
            Err(_) => {
                error!("pipeline thread panicked");
                None
            }
        });
        let speaker_parts = speaker.and_then(|h| match h.join() {
            Ok(parts) => Some(parts),
            Err(_) => {
                error!("speaker thread panicked");
                None
            }
        });
        match (transcriber, speaker_parts) {
            (Some(transcriber), Some((responder, synthesizer))) => {
                *self.collaborators.lock() = Some(Collaborators {
                    transcriber,
                    responder,
                    synthesizer,
                });
            }
            _ => warn!("collaborators not recovered; the engine cannot be restarted"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn status(&self) -> EngineStatus {
        *self.shared.status.lock()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.shared.status_tx.subscribe()
    }

    pub fn subscribe_transcripts(&self) -> broadcast::Receiver<TranscriptEvent> {
        self.shared.transcript_tx.subscribe()
    }

    pub fn subscribe_wake(&self) -> broadcast::Receiver<WakeEvent> {
        self.shared.wake_tx.subscribe()
    }

    /// Throttled RMS + VAD state, roughly ten per second.
    pub fn subscribe_activity(&self) -> broadcast::Receiver<ActivityEvent> {
        self.shared.activity_tx.subscribe()
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.shared.diagnostics.snapshot()
    }

    /// The most recent `secs` of captured audio at the engine rate.
    pub fn recent_audio(&self, secs: f32) -> AudioBuffer {
        AudioBuffer::new(self.shared.ring.read_latest(secs), self.config.sample_rate)
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if self.workers.get_mut().is_some() {
            let _ = self.stop();
        }
    }
}
