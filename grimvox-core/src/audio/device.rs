//! Audio device enumeration.

use serde::{Deserialize, Serialize};

/// One input or output device as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    /// Inputs only: the name suggests it records system output.
    pub is_monitor: bool,
    /// Inputs only: the most likely speech microphone.
    pub is_recommended: bool,
}

/// Substrings of PulseAudio/ALSA/Windows names for capture-of-output devices.
const MONITOR_KEYWORDS: &[&str] = &[
    "monitor of",
    "loopback",
    "stereo mix",
    "what u hear",
    "what you hear",
    "dmix",
    "speakers (",
];

const MIC_KEYWORDS: &[&str] = &[
    "microphone",
    "mic",
    "array",
    "respeaker",
    "seeed",
    "usb",
    "headset",
    "capture",
];

pub fn is_monitor_name(name: &str) -> bool {
    let lowered = name.trim().to_ascii_lowercase();
    MONITOR_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Higher means more likely to be the microphone the appliance wants.
pub fn microphone_score(name: &str) -> i32 {
    let lowered = name.trim().to_ascii_lowercase();
    let mut score = if is_monitor_name(&lowered) { -16 } else { 8 };
    if MIC_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        score += 6;
    }
    if lowered.contains("default") {
        score += 1;
    }
    score
}

/// Mark the recommended input and sort recommended, then default, then by name.
fn rank_inputs(mut list: Vec<DeviceInfo>) -> Vec<DeviceInfo> {
    let best = list
        .iter()
        .enumerate()
        .max_by_key(|(_, d)| microphone_score(&d.name) + if d.is_default { 2 } else { 0 })
        .map(|(i, _)| i);
    if let Some(dev) = best.and_then(|i| list.get_mut(i)) {
        dev.is_recommended = !dev.is_monitor;
    }
    list.sort_by_key(|d| {
        (
            !d.is_recommended,
            d.is_monitor,
            !d.is_default,
            d.name.to_ascii_lowercase(),
        )
    });
    list
}

#[cfg(feature = "audio-cpal")]
fn describe<I>(devices: I, default_name: Option<String>, input: bool) -> Vec<DeviceInfo>
where
    I: Iterator<Item = cpal::Device>,
{
    use cpal::traits::DeviceTrait;

    devices
        .enumerate()
        .map(|(idx, device)| {
            let name = device
                .name()
                .unwrap_or_else(|_| format!("Device {}", idx + 1));
            DeviceInfo {
                is_default: default_name.as_deref() == Some(name.as_str()),
                is_monitor: input && is_monitor_name(&name),
                is_recommended: false,
                name,
            }
        })
        .collect()
}

/// All capture devices, recommended microphone first.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    match host.input_devices() {
        Ok(devices) => rank_inputs(describe(devices, default_name, true)),
        Err(e) => {
            tracing::warn!(error = %e, "failed to enumerate input devices");
            rank_inputs(describe(host.default_input_device().into_iter(), default_name, true))
        }
    }
}

/// All playback devices, default first.
#[cfg(feature = "audio-cpal")]
pub fn list_output_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());
    let mut list = match host.output_devices() {
        Ok(devices) => describe(devices, default_name, false),
        Err(e) => {
            tracing::warn!(error = %e, "failed to enumerate output devices");
            describe(host.default_output_device().into_iter(), default_name, false)
        }
    };
    list.sort_by_key(|d| (!d.is_default, d.name.to_ascii_lowercase()));
    list
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    Vec::new()
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_output_devices() -> Vec<DeviceInfo> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, is_default: bool) -> DeviceInfo {
        DeviceInfo {
            name: name.into(),
            is_default,
            is_monitor: is_monitor_name(name),
            is_recommended: false,
        }
    }

    #[test]
    fn monitor_names_are_detected() {
        assert!(is_monitor_name("Monitor of Built-in Audio Analog Stereo"));
        assert!(is_monitor_name("Stereo Mix (Realtek Audio)"));
        assert!(!is_monitor_name("ReSpeaker 4 Mic Array (UAC1.0)"));
    }

    #[test]
    fn microphone_outscores_monitor() {
        assert!(
            microphone_score("seeed-2mic-voicecard") > microphone_score("Monitor of HDMI Output")
        );
    }

    #[test]
    fn ranking_puts_recommended_mic_first() {
        let ranked = rank_inputs(vec![
            input("Monitor of Built-in Audio", true),
            input("bcm2835 Headphones", false),
            input("USB PnP Sound Device Mic", false),
        ]);
        assert_eq!(ranked[0].name, "USB PnP Sound Device Mic");
        assert!(ranked[0].is_recommended);
        assert!(ranked.iter().filter(|d| d.is_recommended).count() == 1);
        assert_eq!(ranked.last().map(|d| d.is_monitor), Some(true));
    }
}
