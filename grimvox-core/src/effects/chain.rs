use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{EffectChainConfig, EffectStage};
use crate::buffering::AudioBuffer;
use crate::error::{GrimvoxError, Result};

/// Processing above this fraction of the audio's own duration is logged.
const SLOW_REALTIME_FRACTION: f64 = 0.5;

struct Slot {
    stage: Box<dyn EffectStage>,
    enabled: bool,
}

/// Running totals for [`EffectChain::process`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStats {
    pub utterances: u64,
    pub avg_processing_ms: f64,
    pub max_processing_ms: f64,
    pub stage_failures: u64,
    pub total_stages: usize,
    pub enabled_stages: usize,
}

/// Ordered effect stages with skip-and-continue failure isolation.
pub struct EffectChain {
    slots: Vec<Slot>,
    stats: ChainStats,
}

impl EffectChain {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            stats: ChainStats::default(),
        }
    }

    /// Build every stage named in `config`, in order.
    pub fn from_config(config: &EffectChainConfig) -> Result<Self> {
        let mut chain = Self::new();
        for spec in &config.stages {
            chain.push(spec.stage.build()?, spec.enabled);
        }
        info!(
            stages = chain.slots.len(),
            enabled = chain.enabled_count(),
            "effect chain built"
        );
        Ok(chain)
    }

    pub fn push(&mut self, stage: Box<dyn EffectStage>, enabled: bool) {
        debug!(stage = stage.name(), enabled, "effect stage added");
        self.slots.push(Slot { stage, enabled });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.stage.name()).collect()
    }

    fn enabled_count(&self) -> usize {
        self.slots.iter().filter(|s| s.enabled).count()
    }

    /// Enable or disable every stage called `name`. Returns false when no
    /// stage has that name.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        let mut found = false;
        for slot in self.slots.iter_mut().filter(|s| s.stage.name() == name) {
            slot.enabled = enabled;
            found = true;
        }
        if found {
            info!(stage = name, enabled, "effect stage toggled");
        } else {
            warn!(stage = name, "effect stage not found");
        }
        found
    }

    /// Clear carried state (reverb tails) before an unrelated utterance.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.stage.reset();
        }
    }

    pub fn stats(&self) -> ChainStats {
        ChainStats {
            total_stages: self.slots.len(),
            enabled_stages: self.enabled_count(),
            ..self.stats.clone()
        }
    }

    /// Run `input` through every enabled stage.
    ///
    /// A stage that errors, or returns non-finite samples, is skipped: its
    /// input goes on to the next stage unchanged. The output always carries
    /// the input's sample rate.
    pub fn process(&mut self, input: &AudioBuffer) -> AudioBuffer {
        let started = Instant::now();
        let rate = input.sample_rate;

        let mut current: Vec<f32> = input.samples.clone();
        let bad = current.iter().filter(|s| !s.is_finite()).count();
        if bad > 0 {
            warn!(samples = bad, "non-finite input samples zeroed");
            current
                .iter_mut()
                .filter(|s| !s.is_finite())
                .for_each(|s| *s = 0.0);
        }

        for slot in self.slots.iter_mut().filter(|s| s.enabled) {
            let name = slot.stage.name();
            let result = slot.stage.process(&current, rate).and_then(|out| {
                if out.iter().all(|s| s.is_finite()) {
                    Ok(out)
                } else {
                    Err(GrimvoxError::effect(name, "produced non-finite samples"))
                }
            });
            match result {
                Ok(out) => current = out,
                Err(e) => {
                    self.stats.stage_failures += 1;
                    warn!(stage = name, error = %e, "effect stage failed, skipping");
                }
            }
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        let n = self.stats.utterances + 1;
        self.stats.avg_processing_ms += (elapsed_ms - self.stats.avg_processing_ms) / n as f64;
        self.stats.max_processing_ms = self.stats.max_processing_ms.max(elapsed_ms);
        self.stats.utterances = n;

        let audio_ms = input.duration_secs() * 1_000.0;
        if audio_ms > 0.0 && elapsed_ms > audio_ms * SLOW_REALTIME_FRACTION {
            warn!(
                processing_ms = elapsed_ms,
                audio_ms, "effects processing slower than half real time"
            );
        } else {
            debug!(processing_ms = elapsed_ms, audio_ms, "effects applied");
        }

        AudioBuffer::new(current, rate)
    }
}

impl Default for EffectChain {
    fn default() -> Self {
        Self::new()
    }
}
