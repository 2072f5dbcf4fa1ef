//! Persistent host settings (JSON file in the user config directory).

use std::fs;
use std::path::{Path, PathBuf};

use grimvox_core::EngineConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub engine: EngineConfig,
    /// Spoken for every reply by `listen`; a tone is used when absent.
    pub reply_wav: Option<PathBuf>,
    /// Print engine events to stdout as JSON lines.
    pub print_events: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            reply_wav: None,
            print_events: true,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        let engine = &mut self.engine;
        engine.sample_rate = engine.sample_rate.clamp(8_000, 48_000);
        engine.frame_ms = engine.frame_ms.clamp(5, 100);
        engine.ring_secs = finite_or(engine.ring_secs, 10.0).clamp(1.0, 60.0);
        engine.stop_check_factor = finite_or(engine.stop_check_factor, 2.0).clamp(1.0, 10.0);
        engine.poll_interval_ms = engine.poll_interval_ms.clamp(10, 1_000);

        let vad = &mut engine.vad;
        vad.speech_threshold = finite_or(vad.speech_threshold, 0.02).clamp(0.001, 1.0);
        vad.silence_threshold =
            finite_or(vad.silence_threshold, 0.01).clamp(0.0, vad.speech_threshold);
        vad.min_speech_frames = vad.min_speech_frames.clamp(1, 50);
        vad.min_silence_frames = vad.min_silence_frames.clamp(1, 500);

        let wake = &mut engine.wake;
        wake.phrases = normalize_phrases(&wake.phrases);
        wake.stop_phrases = normalize_phrases(&wake.stop_phrases);
        wake.confirm_threshold = wake.confirm_threshold.clamp(1, 10);
        wake.debounce_ms = wake.debounce_ms.min(60_000);
        wake.amplitude_threshold = finite_or(wake.amplitude_threshold, 0.05).clamp(0.001, 1.0);
        wake.amplitude_window_secs = finite_or(wake.amplitude_window_secs, 1.0).clamp(0.05, 5.0);
        if wake.follow_up_prompt.trim().is_empty() {
            wake.follow_up_prompt = grimvox_core::WakeConfig::default().follow_up_prompt;
        }

        let led = &mut engine.led;
        led.brightness_min = finite_or(led.brightness_min, 5.0).clamp(0.0, 100.0);
        led.brightness_max = finite_or(led.brightness_max, 85.0).clamp(led.brightness_min, 100.0);
        led.gain = finite_or(led.gain, 120.0).clamp(0.0, 10_000.0);
        led.smoothing = finite_or(led.smoothing, 0.85).clamp(0.0, 0.99);
        led.tick_ms = led.tick_ms.clamp(1, 1_000);
        led.window_samples = led.window_samples.clamp(16, 65_536);

        engine.pwm.frequency_hz = engine.pwm.frequency_hz.clamp(50, 100_000);

        // History must cover everything the listener reads back.
        let longest = [
            engine.wake.amplitude_window_secs,
            engine.question.pre_roll_secs,
            engine.follow_up.pre_roll_secs,
            engine.wake_utterance.pre_roll_secs,
        ]
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(0.0f32, f32::max);
        engine.ring_secs = engine.ring_secs.max(longest);

        engine.preferred_input_device = engine
            .preferred_input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
    }
}

fn finite_or(v: f32, fallback: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        fallback
    }
}

fn normalize_phrases(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for phrase in raw {
        let normalized = phrase.trim().to_lowercase();
        if normalized.is_empty() || out.contains(&normalized) {
            continue;
        }
        out.push(normalized);
        if out.len() >= 64 {
            break;
        }
    }
    out
}

pub fn default_settings_path() -> PathBuf {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".config")
        })
        .join("grimvox")
        .join("settings.json")
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<AppSettings>(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "settings unreadable, using defaults");
            AppSettings::default()
        }),
        Err(_) => AppSettings::default(),
    };
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
