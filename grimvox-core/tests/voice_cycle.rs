use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use grimvox_core::audio::{
    CaptureFactory, CaptureFlags, CaptureStream, PlaybackCursor, PlaybackDevice, PlaybackFactory,
};
use grimvox_core::buffering::{AudioBuffer, CaptureProducer, Producer};
use grimvox_core::collab::{FallbackSynthesizer, ToneSynthesizer};
use grimvox_core::effects::{EffectChain, EffectChainConfig};
use grimvox_core::engine::{Devices, EngineConfig, Orchestrator};
use grimvox_core::events::{EngineStatus, TranscriptKind, WakeEvent};
use grimvox_core::segment::{SegmentConfig, SegmentOutcome, SegmentRecorder};
use grimvox_core::vad::{EnergyVad, VadConfig, VadState, VoiceActivityDetector};
use grimvox_core::wake::{WakeConfirmation, WakeSource};
use grimvox_core::{
    Collaborators, GrimvoxError, LedDriver, Responder, Synthesizer, Transcriber, Transcript,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

const RATE: u32 = 16_000;
const FRAME: usize = 320;

fn tone(secs: f32, amplitude: f32) -> Vec<f32> {
    let n = (secs * RATE as f32) as usize;
    (0..n)
        .map(|i| amplitude * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / RATE as f32).sin())
        .collect()
}

/// Alternating ±`level`, so every frame's RMS is exactly `level`.
fn steady(secs: f32, level: f32) -> Vec<f32> {
    let n = (secs * RATE as f32) as usize;
    (0..n).map(|i| if i % 2 == 0 { level } else { -level }).collect()
}

/// Scripted microphone. Queued audio plays first, then the background
/// level forever. Tests can queue more speech while the engine runs.
#[derive(Clone)]
struct Mic {
    queue: Arc<Mutex<VecDeque<f32>>>,
    background: f32,
}

impl Mic {
    fn new(background: f32) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            background,
        }
    }

    /// 0.3 s of background, then 0.8 s of loud speech.
    fn one_utterance() -> Self {
        let mic = Self::new(0.0);
        mic.pause(0.3);
        mic.say(0.8);
        mic
    }

    fn say(&self, secs: f32) {
        self.queue.lock().extend(tone(secs, 0.3));
    }

    fn pause(&self, secs: f32) {
        self.queue.lock().extend(steady(secs, self.background));
    }

    fn next_chunk(&self, start: usize) -> Vec<f32> {
        let mut queue = self.queue.lock();
        (start..start + FRAME)
            .map(|i| {
                queue.pop_front().unwrap_or(if i % 2 == 0 {
                    self.background
                } else {
                    -self.background
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Feeds a [`Mic`] into the capture ring at four times real time.
struct FakeCapture {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl CaptureStream for FakeCapture {
    fn sample_rate(&self) -> u32 {
        RATE
    }
}

impl Drop for FakeCapture {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn fake_capture(mic: Mic) -> CaptureFactory {
    Arc::new(move |mut producer: CaptureProducer, _flags: CaptureFlags| {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let mic = mic.clone();
        let worker = thread::spawn(move || {
            let mut t = 0usize;
            while !flag.load(Ordering::Acquire) {
                let chunk = mic.next_chunk(t);
                producer.push_slice(&chunk);
                t += FRAME;
                thread::sleep(Duration::from_millis(5));
            }
        });
        Ok(Box::new(FakeCapture {
            stop,
            worker: Some(worker),
        }) as Box<dyn CaptureStream>)
    })
}

fn failing_capture() -> CaptureFactory {
    Arc::new(|_producer: CaptureProducer, _flags: CaptureFlags| {
        Err(GrimvoxError::NoDefaultInputDevice)
    })
}

/// Plays ten times faster than real time and records what it was given.
#[derive(Default)]
struct FastDevice {
    cursor: Option<PlaybackCursor>,
    worker: Option<JoinHandle<()>>,
    played: Arc<Mutex<Vec<usize>>>,
}

impl PlaybackDevice for FastDevice {
    fn start(&mut self, audio: &AudioBuffer) -> grimvox_core::Result<PlaybackCursor> {
        self.stop();
        self.played.lock().push(audio.len());
        let cursor = PlaybackCursor::new(audio.len());
        let c = cursor.clone();
        self.worker = Some(thread::spawn(move || {
            while c.is_playing() {
                c.advance(1_600);
                thread::sleep(Duration::from_millis(10));
            }
        }));
        self.cursor = Some(cursor.clone());
        Ok(cursor)
    }

    fn stop(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            cursor.finish();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn fast_playback(played: Arc<Mutex<Vec<usize>>>) -> PlaybackFactory {
    Arc::new(move || {
        Ok(Box::new(FastDevice {
            played: Arc::clone(&played),
            ..FastDevice::default()
        }) as Box<dyn PlaybackDevice>)
    })
}

fn devices(capture: CaptureFactory, played: Arc<Mutex<Vec<usize>>>) -> Devices {
    Devices {
        capture,
        playback: fast_playback(played),
        led: Arc::new(|led: &grimvox_core::LedConfig, _pwm: &grimvox_core::PwmConfig| {
            LedDriver::disabled(led.clone())
        }),
    }
}

/// Returns its lines in order, then empty text.
struct ScriptedTranscriber {
    lines: VecDeque<String>,
}

impl ScriptedTranscriber {
    fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Transcriber for ScriptedTranscriber {
    fn transcribe(&mut self, _audio: &AudioBuffer) -> grimvox_core::Result<Transcript> {
        Ok(Transcript::new(self.lines.pop_front().unwrap_or_default(), 0.9))
    }
}

struct FailingTranscriber;

impl Transcriber for FailingTranscriber {
    fn transcribe(&mut self, _audio: &AudioBuffer) -> grimvox_core::Result<Transcript> {
        Err(GrimvoxError::Collaborator("speech service offline".into()))
    }
}

struct RecordingResponder {
    questions: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl Responder for RecordingResponder {
    fn respond(&mut self, question: &str) -> grimvox_core::Result<String> {
        self.questions.lock().push(question.to_string());
        if self.fail {
            return Err(GrimvoxError::Collaborator("oracle unreachable".into()));
        }
        Ok("As you wish".into())
    }
}

/// Remembers every text it was asked to speak; each reply lasts `secs`.
struct RecordingSynthesizer {
    spoken: Arc<Mutex<Vec<String>>>,
    secs: f32,
}

impl Synthesizer for RecordingSynthesizer {
    fn name(&self) -> &str {
        "recording"
    }

    fn synthesize(&mut self, text: &str) -> grimvox_core::Result<AudioBuffer> {
        self.spoken.lock().push(text.to_string());
        Ok(AudioBuffer::new(tone(self.secs, 0.4), RATE))
    }
}

struct BrokenSynthesizer;

impl Synthesizer for BrokenSynthesizer {
    fn name(&self) -> &str {
        "broken"
    }

    fn synthesize(&mut self, _text: &str) -> grimvox_core::Result<AudioBuffer> {
        Err(GrimvoxError::Collaborator("voice service offline".into()))
    }
}

fn collaborators(lines: &[&str], questions: Arc<Mutex<Vec<String>>>) -> Collaborators {
    Collaborators {
        transcriber: Box::new(ScriptedTranscriber::new(lines)),
        responder: Box::new(RecordingResponder {
            questions,
            fail: false,
        }),
        synthesizer: Box::new(FallbackSynthesizer::new(vec![
            Box::new(BrokenSynthesizer),
            Box::new(ToneSynthesizer::new(RATE)),
        ])),
    }
}

/// Everything a conversation test wants to look at afterwards.
#[derive(Clone, Default)]
struct Script {
    questions: Arc<Mutex<Vec<String>>>,
    spoken: Arc<Mutex<Vec<String>>>,
    played: Arc<Mutex<Vec<usize>>>,
}

impl Script {
    fn collaborators(
        &self,
        transcriber: Box<dyn Transcriber>,
        responder_fails: bool,
        reply_secs: f32,
    ) -> Collaborators {
        Collaborators {
            transcriber,
            responder: Box::new(RecordingResponder {
                questions: Arc::clone(&self.questions),
                fail: responder_fails,
            }),
            synthesizer: Box::new(RecordingSynthesizer {
                spoken: Arc::clone(&self.spoken),
                secs: reply_secs,
            }),
        }
    }

    fn orchestrator(
        &self,
        config: EngineConfig,
        mic: &Mic,
        collaborators: Collaborators,
    ) -> Orchestrator {
        Orchestrator::new(
            config,
            collaborators,
            devices(fake_capture(mic.clone()), Arc::clone(&self.played)),
        )
        .expect("orchestrator")
    }

    fn questions(&self) -> Vec<String> {
        self.questions.lock().clone()
    }

    fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }
}

fn test_config(source: WakeSource) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.wake.source = source;
    config.follow_up.onset_timeout_secs = Some(0.5);
    config.effects = EffectChainConfig::passthrough();
    config.poll_interval_ms = 10;
    config
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) {
    let start = Instant::now();
    while !done() {
        if start.elapsed() >= timeout {
            panic!("timed out waiting for the voice cycle");
        }
        thread::sleep(Duration::from_millis(10));
    }
}

fn drain<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(ev) => out.push(ev),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return out,
        }
    }
}

// ---------------------------------------------------------------------------
// Component scenarios
// ---------------------------------------------------------------------------

#[test]
fn vad_and_recorder_cut_one_utterance() {
    let mut vad = EnergyVad::new(VadConfig {
        speech_threshold: 0.02,
        silence_threshold: 0.01,
        min_speech_frames: 3,
        min_silence_frames: 20,
    });
    let config = SegmentConfig {
        speech_timeout_secs: 0.8,
        ..SegmentConfig::question()
    };
    let pre_roll = steady(config.pre_roll_secs, 0.001);
    let mut recorder = SegmentRecorder::new(config, RATE);
    recorder.begin(&pre_roll);

    let mut audio = steady(1.0, 0.05);
    audio.extend(steady(1.0, 0.001));

    let mut finalized = Vec::new();
    let mut states = Vec::new();
    for frame in audio.chunks_exact(FRAME) {
        let verdict = vad.classify(frame);
        states.push(verdict.state);
        match recorder.push(frame, verdict.voiced) {
            SegmentOutcome::Continue => {}
            SegmentOutcome::Finalized(s) => finalized.push(s),
            SegmentOutcome::Discarded(reason) => panic!("discarded: {reason:?}"),
        }
    }

    assert_eq!(finalized.len(), 1);
    let segment = &finalized[0];
    assert!(!segment.forced);
    let secs = segment.total_duration_secs;
    assert!((1.0..=1.2).contains(&secs), "segment was {secs}s");

    // The whole second of loud frames made it in, after the pre-roll.
    let loud = segment.audio.samples.iter().filter(|s| s.abs() > 0.04).count();
    assert_eq!(loud, RATE as usize);
    assert_eq!(segment.audio.samples[pre_roll.len()].abs(), 0.05);

    assert_eq!(states[2], VadState::Speech);
    assert_eq!(states.last().copied(), Some(VadState::Silence));
}

#[test]
fn wake_needs_consecutive_hits() {
    let mut wake = WakeConfirmation::new(2, Duration::from_millis(1_000));
    let t0 = Instant::now();
    let at = |ms: u64| t0 + Duration::from_millis(ms);

    assert!(!wake.observe_at(true, at(0)));
    assert!(!wake.observe_at(false, at(100)));
    assert!(!wake.observe_at(true, at(200)));
    assert!(wake.observe_at(true, at(300)));
    // Debounced.
    assert!(!wake.observe_at(true, at(400)));
    assert!(!wake.observe_at(true, at(500)));
}

#[test]
fn fallback_synthesizer_skips_broken_provider() {
    let mut voice =
        FallbackSynthesizer::new(vec![Box::new(BrokenSynthesizer), Box::new(ToneSynthesizer::new(RATE))]);
    let audio = voice.synthesize("hail").expect("tone fallback");
    assert!(!audio.is_empty());
    assert_eq!(voice.current_provider(), Some("tone"));
}

#[test]
fn demonic_chain_is_repeatable_and_bounded() {
    let mut chain = EffectChain::from_config(&EffectChainConfig::demonic()).expect("chain");
    let voice = AudioBuffer::new(tone(0.5, 0.8), RATE);

    let first = chain.process(&voice);
    chain.reset();
    let second = chain.process(&voice);

    assert_eq!(first.sample_rate, RATE);
    assert_eq!(first.samples, second.samples);
    assert!(first.peak() <= 0.95 + 1e-4, "peak {}", first.peak());
    assert!(first.samples.iter().all(|s| s.is_finite()));
}

// ---------------------------------------------------------------------------
// Full cycle through the orchestrator
// ---------------------------------------------------------------------------

#[test]
fn amplitude_wake_then_question_then_reply() {
    let questions = Arc::new(Mutex::new(Vec::new()));
    let played = Arc::new(Mutex::new(Vec::new()));
    let orchestrator = Orchestrator::new(
        test_config(WakeSource::Amplitude),
        collaborators(&["what is the hour"], Arc::clone(&questions)),
        devices(fake_capture(Mic::one_utterance()), Arc::clone(&played)),
    )
    .expect("orchestrator");

    let mut wakes = orchestrator.subscribe_wake();
    let mut transcripts = orchestrator.subscribe_transcripts();

    orchestrator.start().expect("start");
    assert!(matches!(orchestrator.start(), Err(GrimvoxError::AlreadyRunning)));

    wait_until(Duration::from_secs(15), || {
        orchestrator.diagnostics().replies_completed >= 1
            && orchestrator.status() == EngineStatus::Listening
    });

    assert_eq!(questions.lock().as_slice(), ["what is the hour".to_string()]);
    assert_eq!(played.lock().len(), 1);

    let wakes: Vec<WakeEvent> = drain(&mut wakes);
    assert_eq!(wakes.len(), 1);
    assert!(wakes[0].phrase.is_none());

    let transcripts = drain(&mut transcripts);
    assert!(transcripts
        .iter()
        .any(|t| t.kind == TranscriptKind::Question && t.text == "what is the hour"));

    let diagnostics = orchestrator.diagnostics();
    assert_eq!(diagnostics.wake_confirmations, 1);
    assert!(diagnostics.frames_in > 0);

    orchestrator.stop().expect("stop");
    assert_eq!(orchestrator.status(), EngineStatus::Stopped);
    assert!(matches!(orchestrator.stop(), Err(GrimvoxError::NotRunning)));

    // Collaborators came back, so the engine can run again.
    orchestrator.start().expect("restart");
    orchestrator.stop().expect("stop again");
}

#[test]
fn question_in_the_wake_breath_is_answered_directly() {
    let questions = Arc::new(Mutex::new(Vec::new()));
    let played = Arc::new(Mutex::new(Vec::new()));
    let orchestrator = Orchestrator::new(
        test_config(WakeSource::Transcript),
        collaborators(
            &["Dark one, what is the hour of doom"],
            Arc::clone(&questions),
        ),
        devices(fake_capture(Mic::one_utterance()), Arc::clone(&played)),
    )
    .expect("orchestrator");
    let mut wakes = orchestrator.subscribe_wake();

    orchestrator.start().expect("start");
    wait_until(Duration::from_secs(15), || {
        orchestrator.diagnostics().replies_completed >= 1
    });
    orchestrator.stop().expect("stop");

    assert_eq!(
        questions.lock().as_slice(),
        ["what is the hour of doom".to_string()]
    );
    let wakes = drain(&mut wakes);
    assert_eq!(wakes.len(), 1);
    assert_eq!(wakes[0].phrase.as_deref(), Some("dark one"));
    assert_eq!(wakes[0].question.as_deref(), Some("what is the hour of doom"));
}

#[test]
fn capture_failure_surfaces_and_allows_retry() {
    let orchestrator = Orchestrator::new(
        test_config(WakeSource::Amplitude),
        collaborators(&[], Arc::new(Mutex::new(Vec::new()))),
        devices(failing_capture(), Arc::new(Mutex::new(Vec::new()))),
    )
    .expect("orchestrator");

    assert!(matches!(
        orchestrator.start(),
        Err(GrimvoxError::NoDefaultInputDevice)
    ));
    assert_eq!(orchestrator.status(), EngineStatus::Error);
    assert!(!orchestrator.is_running());

    // Second attempt fails the same way rather than losing the collaborators.
    assert!(matches!(
        orchestrator.start(),
        Err(GrimvoxError::NoDefaultInputDevice)
    ));
}

// ---------------------------------------------------------------------------
// Conversation paths
// ---------------------------------------------------------------------------

#[test]
fn transcript_wake_recovers_when_hum_holds_the_detector() {
    // Hum between the silence and speech thresholds keeps the VAD in its
    // dead band after the first utterance closes.
    let mic = Mic::new(0.015);
    mic.say(0.8);
    mic.pause(1.5);
    mic.say(0.8);

    let script = Script::default();
    let transcriber =
        ScriptedTranscriber::new(&["hello there", "dark one what is the hour of doom"]);
    let orchestrator = script.orchestrator(
        test_config(WakeSource::Transcript),
        &mic,
        script.collaborators(Box::new(transcriber), false, 0.2),
    );

    orchestrator.start().expect("start");
    wait_until(Duration::from_secs(15), || {
        orchestrator.diagnostics().replies_completed >= 1
    });
    orchestrator.stop().expect("stop");

    assert_eq!(script.questions(), ["what is the hour of doom".to_string()]);
    let diagnostics = orchestrator.diagnostics();
    assert!(diagnostics.transcriptions >= 2);
    assert_eq!(diagnostics.wake_confirmations, 1);
}

#[test]
fn stop_phrase_during_playback_interrupts_the_reply() {
    let mic = Mic::one_utterance();
    let script = Script::default();
    let transcriber = ScriptedTranscriber::new(&["what is the hour", "stop"]);
    let orchestrator = script.orchestrator(
        test_config(WakeSource::Amplitude),
        &mic,
        // Thirty seconds of reply: three seconds on the fast device.
        script.collaborators(Box::new(transcriber), false, 30.0),
    );
    let mut transcripts = orchestrator.subscribe_transcripts();

    orchestrator.start().expect("start");
    wait_until(Duration::from_secs(15), || {
        orchestrator.status() == EngineStatus::Speaking
    });
    mic.say(0.6);
    wait_until(Duration::from_secs(15), || {
        orchestrator.diagnostics().replies_interrupted >= 1
            && orchestrator.status() == EngineStatus::Listening
    });

    let diagnostics = orchestrator.diagnostics();
    assert_eq!(diagnostics.replies_completed, 0);
    assert_eq!(script.spoken(), ["As you wish".to_string()]);
    assert_eq!(script.played.lock().as_slice(), [30 * RATE as usize]);

    let transcripts = drain(&mut transcripts);
    assert!(transcripts
        .iter()
        .any(|t| t.kind == TranscriptKind::StopCheck && t.text == "stop"));
    assert!(transcripts.iter().all(|t| t.kind != TranscriptKind::FollowUp));

    orchestrator.stop().expect("stop");
}

#[test]
fn failing_responder_abandons_the_reply() {
    let mic = Mic::one_utterance();
    let script = Script::default();
    let transcriber = ScriptedTranscriber::new(&["what is the hour"]);
    let orchestrator = script.orchestrator(
        test_config(WakeSource::Amplitude),
        &mic,
        script.collaborators(Box::new(transcriber), true, 0.2),
    );

    orchestrator.start().expect("start");
    wait_until(Duration::from_secs(15), || {
        orchestrator.diagnostics().collaborator_errors >= 1
            && orchestrator.status() == EngineStatus::Listening
    });
    orchestrator.stop().expect("stop");

    assert_eq!(script.questions(), ["what is the hour".to_string()]);
    assert!(script.spoken().is_empty());
    assert!(script.played.lock().is_empty());
    assert_eq!(orchestrator.diagnostics().replies_completed, 0);
}

#[test]
fn failing_transcriber_returns_to_listening() {
    let mic = Mic::one_utterance();
    let script = Script::default();
    let orchestrator = script.orchestrator(
        test_config(WakeSource::Amplitude),
        &mic,
        script.collaborators(Box::new(FailingTranscriber), false, 0.2),
    );

    orchestrator.start().expect("start");
    wait_until(Duration::from_secs(15), || {
        orchestrator.diagnostics().transcription_errors >= 1
            && orchestrator.status() == EngineStatus::Listening
    });
    orchestrator.stop().expect("stop");

    assert!(script.questions().is_empty());
    assert!(script.spoken().is_empty());
    assert_eq!(orchestrator.diagnostics().wake_confirmations, 1);
}

#[test]
fn follow_ups_continue_until_an_answer_is_too_short() {
    let mic = Mic::one_utterance();
    let script = Script::default();
    let transcriber = ScriptedTranscriber::new(&["what is the hour", "and what of the day", "ok"]);
    let mut config = test_config(WakeSource::Amplitude);
    config.follow_up.onset_timeout_secs = Some(4.0);
    let orchestrator = script.orchestrator(
        config,
        &mic,
        script.collaborators(Box::new(transcriber), false, 0.2),
    );
    let mut transcripts = orchestrator.subscribe_transcripts();

    orchestrator.start().expect("start");
    for replies in 1..=2 {
        wait_until(Duration::from_secs(15), || {
            orchestrator.diagnostics().replies_completed >= replies
                && orchestrator.status() == EngineStatus::Recording
        });
        mic.say(0.8);
    }
    wait_until(Duration::from_secs(15), || {
        orchestrator.diagnostics().transcriptions >= 3
            && orchestrator.status() == EngineStatus::Listening
    });
    orchestrator.stop().expect("stop");

    assert_eq!(
        script.questions(),
        ["what is the hour".to_string(), "and what of the day".to_string()]
    );
    assert_eq!(script.spoken().len(), 2);
    let kinds: Vec<TranscriptKind> = drain(&mut transcripts).iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        [
            TranscriptKind::Question,
            TranscriptKind::FollowUp,
            TranscriptKind::FollowUp
        ]
    );
    assert_eq!(orchestrator.diagnostics().replies_completed, 2);
}

#[test]
fn stop_phrase_in_a_follow_up_ends_the_conversation() {
    let mic = Mic::one_utterance();
    let script = Script::default();
    let transcriber = ScriptedTranscriber::new(&["what is the hour", "be silent now"]);
    let mut config = test_config(WakeSource::Amplitude);
    config.follow_up.onset_timeout_secs = Some(4.0);
    let orchestrator = script.orchestrator(
        config,
        &mic,
        script.collaborators(Box::new(transcriber), false, 0.2),
    );

    orchestrator.start().expect("start");
    wait_until(Duration::from_secs(15), || {
        orchestrator.diagnostics().replies_completed >= 1
            && orchestrator.status() == EngineStatus::Recording
    });
    mic.say(0.8);
    wait_until(Duration::from_secs(15), || {
        orchestrator.diagnostics().transcriptions >= 2
            && orchestrator.status() == EngineStatus::Listening
    });
    orchestrator.stop().expect("stop");

    assert_eq!(script.questions(), ["what is the hour".to_string()]);
    assert_eq!(script.spoken().len(), 1);
    assert_eq!(orchestrator.diagnostics().replies_completed, 1);
}

#[test]
fn missing_question_speaks_the_prompt() {
    let mic = Mic::one_utterance();
    let script = Script::default();
    let config = test_config(WakeSource::Amplitude);
    let prompt = config.wake.follow_up_prompt.clone();
    let orchestrator = script.orchestrator(
        config,
        &mic,
        script.collaborators(Box::new(ScriptedTranscriber::new(&[])), false, 0.2),
    );

    orchestrator.start().expect("start");
    wait_until(Duration::from_secs(15), || {
        orchestrator.diagnostics().replies_completed >= 1
            && orchestrator.status() == EngineStatus::Listening
    });
    orchestrator.stop().expect("stop");

    assert!(script.questions().is_empty());
    assert_eq!(script.spoken(), [prompt]);
    // The follow-up after the prompt heard nothing and was dropped.
    assert!(orchestrator.diagnostics().segments_discarded >= 1);
}
