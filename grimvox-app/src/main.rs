//! Grimvox appliance host.
//!
//! ## Runtime note
//!
//! The orchestrator runs its own pipeline and speaker threads. Tokio is only
//! used here to forward broadcast events and to wait for Ctrl-C; blocking
//! engine calls go through `spawn_blocking`.

mod settings;

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use grimvox_core::{
    audio::{list_input_devices, list_output_devices, read_wav, write_wav, CpalPlayback},
    collab::{EchoResponder, FallbackSynthesizer, SilentTranscriber, ToneSynthesizer, WavSynthesizer},
    play_with_envelope,
    playback::DEFAULT_POLL_INTERVAL,
    wake::WakeSource,
    Collaborators, Devices, EffectChain, LedDriver, Orchestrator, Synthesizer,
};
use serde::Serialize;
use settings::{default_settings_path, load_settings, save_settings, AppSettings};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "grimvox", author, version, about = "Voice appliance front-end")]
struct Cli {
    /// Settings file (JSON)
    #[arg(long, global = true, env = "GRIMVOX_CONFIG")]
    config: Option<PathBuf>,

    /// -v for debug, -vv for trace. RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full listen → answer → speak cycle until Ctrl-C
    Listen {
        /// Input device name (see `grimvox devices`)
        #[arg(long)]
        input_device: Option<String>,

        /// WAV file spoken for every reply
        #[arg(long)]
        reply_wav: Option<PathBuf>,
    },

    /// Run a WAV file through the configured effect chain
    Effects { input: PathBuf, output: PathBuf },

    /// Play a WAV file with the LED following it
    Play {
        input: PathBuf,

        /// Skip the effect chain
        #[arg(long)]
        no_effects: bool,
    },

    /// List audio input and output devices
    Devices,
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "grimvox=info",
        1 => "grimvox=debug",
        _ => "grimvox=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings_path = cli.config.unwrap_or_else(default_settings_path);
    let settings = load_settings(&settings_path);
    if !settings_path.exists() {
        match save_settings(&settings_path, &settings) {
            Ok(()) => info!(path = %settings_path.display(), "wrote default settings"),
            Err(e) => warn!(
                path = %settings_path.display(),
                error = %e,
                "could not write default settings"
            ),
        }
    }
    info!(
        settings_path = %settings_path.display(),
        sample_rate = settings.engine.sample_rate,
        wake_source = ?settings.engine.wake.source,
        stages = settings.engine.effects.stages.len(),
        "settings loaded"
    );

    match cli.command {
        Commands::Listen {
            input_device,
            reply_wav,
        } => listen(settings, input_device, reply_wav).await,
        Commands::Effects { input, output } => effects(&settings, input, output),
        Commands::Play { input, no_effects } => play(settings, input, no_effects).await,
        Commands::Devices => devices(),
    }
}

async fn listen(
    mut settings: AppSettings,
    input_device: Option<String>,
    reply_wav: Option<PathBuf>,
) -> Result<()> {
    if input_device.is_some() {
        settings.engine.preferred_input_device = input_device;
    }
    // The host ships no transcriber, so wake comes from the amplitude trigger.
    settings.engine.wake.source = WakeSource::Amplitude;

    let mut voices: Vec<Box<dyn Synthesizer>> = Vec::new();
    if let Some(path) = reply_wav.or(settings.reply_wav.clone()) {
        voices.push(Box::new(WavSynthesizer::new(path)));
    }
    voices.push(Box::new(ToneSynthesizer::new(settings.engine.sample_rate)));

    let collaborators = Collaborators {
        transcriber: Box::new(SilentTranscriber::default()),
        responder: Box::new(EchoResponder::default()),
        synthesizer: Box::new(FallbackSynthesizer::new(voices)),
    };
    let devices = Devices::system(settings.engine.preferred_input_device.clone());
    let orchestrator = Arc::new(
        Orchestrator::new(settings.engine.clone(), collaborators, devices)
            .context("invalid engine configuration")?,
    );

    if settings.print_events {
        forward("status", orchestrator.subscribe_status());
        forward("wake", orchestrator.subscribe_wake());
        forward("transcript", orchestrator.subscribe_transcripts());
    }

    let engine = Arc::clone(&orchestrator);
    tokio::task::spawn_blocking(move || engine.start())
        .await
        .context("engine start task failed")?
        .context("failed to start engine")?;
    info!("listening, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    let engine = Arc::clone(&orchestrator);
    tokio::task::spawn_blocking(move || engine.stop())
        .await
        .context("engine stop task failed")?
        .context("failed to stop engine")?;

    let diagnostics = orchestrator.diagnostics();
    println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    Ok(())
}

/// Print every event from `rx` as one JSON line.
fn forward<T>(label: &'static str, mut rx: broadcast::Receiver<T>)
where
    T: Serialize + Clone + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let line = serde_json::json!({ "event": label, "data": event });
                    println!("{line}");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(label, skipped, "event printer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn effects(settings: &AppSettings, input: PathBuf, output: PathBuf) -> Result<()> {
    let voice = read_wav(&input).with_context(|| format!("failed to read {}", input.display()))?;
    let mut chain =
        EffectChain::from_config(&settings.engine.effects).context("invalid effect chain")?;
    let rendered = chain.process(&voice);
    write_wav(&output, &rendered)
        .with_context(|| format!("failed to write {}", output.display()))?;

    let stats = chain.stats();
    info!(
        input_secs = voice.duration_secs(),
        output_secs = rendered.duration_secs(),
        processing_ms = stats.max_processing_ms,
        stage_failures = stats.stage_failures,
        "effects applied"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn play(settings: AppSettings, input: PathBuf, no_effects: bool) -> Result<()> {
    let voice = read_wav(&input).with_context(|| format!("failed to read {}", input.display()))?;
    let audio = if no_effects {
        voice
    } else {
        EffectChain::from_config(&settings.engine.effects)
            .context("invalid effect chain")?
            .process(&voice)
    };

    let stop = Arc::new(AtomicBool::new(false));
    let on_signal = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.store(true, Ordering::Release);
        }
    });

    let engine = settings.engine;
    let outcome = tokio::task::spawn_blocking(move || -> Result<_> {
        // cpal output streams are !Send; open on the thread that plays.
        let mut device = CpalPlayback::open_default().context("failed to open output device")?;
        let mut led = if engine.pwm.enabled {
            LedDriver::from_pwm(engine.led.clone(), &engine.pwm)
        } else {
            LedDriver::disabled(engine.led.clone())
        };
        let outcome =
            play_with_envelope(&mut device, &audio, &mut led, &stop, DEFAULT_POLL_INTERVAL)
                .context("playback failed")?;
        led.rest();
        Ok(outcome)
    })
    .await
    .context("playback task failed")??;

    println!("{}", serde_json::json!({ "outcome": outcome }));
    Ok(())
}

fn devices() -> Result<()> {
    let listing = serde_json::json!({
        "inputs": list_input_devices(),
        "outputs": list_output_devices(),
    });
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}
