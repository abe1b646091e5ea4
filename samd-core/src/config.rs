//! Detector configuration.
//!
//! Every tunable lives in one of three structs, set at construction and
//! validated before any audio is processed. All of them deserialize from
//! camelCase JSON with missing fields falling back to the defaults, so a
//! config file only needs to name what it changes:
//!
//! ```json
//! { "machineMs": 1500, "vad": { "energyThreshold": 200.0 } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AmdError, Result};

/// Lowest supported input rate.
pub const MIN_SAMPLE_RATE: u32 = 8_000;

/// Thresholds are mean absolute amplitudes of 16-bit audio.
const MAX_ENERGY: f64 = i16::MAX as f64;

/// Voice activity detector tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct VadConfig {
    /// Frame energy above this is voice (once the initial adjust window has passed).
    pub energy_threshold: f64,
    /// Frame energy above this is always voice; also caps threshold adaptation.
    pub max_energy_threshold: f64,
    /// Contiguous voice needed to enter the voice state.
    pub voice_ms: u32,
    /// Contiguous silence needed to leave the voice state.
    pub silence_ms: u32,
    /// Stream time of the first threshold adjustment. 0 disables it.
    pub initial_adjust_ms: u32,
    /// Delay after first voice onset of the second adjustment. 0 disables it.
    pub voice_adjust_ms: u32,
    /// An adjustment may raise the threshold by at most this factor.
    pub adjust_limit: f64,
    /// Average energy is scaled by this before being used as a threshold.
    /// Must stay below 1 so a steady signal remains above its own threshold.
    pub adjust_multiplier: f64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 130.0,
            max_energy_threshold: 1_300.0,
            voice_ms: 20,
            silence_ms: 500,
            initial_adjust_ms: 100,
            voice_adjust_ms: 50,
            adjust_limit: 3.0,
            adjust_multiplier: 0.8,
        }
    }
}

impl VadConfig {
    pub fn validate(&self) -> Result<()> {
        check_energy("vad.energyThreshold", self.energy_threshold)?;
        check_energy("vad.maxEnergyThreshold", self.max_energy_threshold)?;
        if self.max_energy_threshold < self.energy_threshold {
            return Err(AmdError::invalid(
                "vad.maxEnergyThreshold",
                format!(
                    "must be >= energyThreshold ({} < {})",
                    self.max_energy_threshold, self.energy_threshold
                ),
            ));
        }
        check_positive_ms("vad.voiceMs", self.voice_ms)?;
        check_positive_ms("vad.silenceMs", self.silence_ms)?;
        check_positive_factor("vad.adjustLimit", self.adjust_limit)?;
        if !(self.adjust_multiplier > 0.0 && self.adjust_multiplier < 1.0) {
            return Err(AmdError::invalid(
                "vad.adjustMultiplier",
                format!("must be in (0, 1) (got {})", self.adjust_multiplier),
            ));
        }
        Ok(())
    }
}

/// Beep detector tunables. The defaults were derived from recorded
/// telephony greeting beeps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct BeepConfig {
    /// Frame energy above this may start a tone candidate.
    pub start_energy: f64,
    /// A tone frame must stay above `min_energy * band_low`.
    pub band_low: f64,
    /// A tone frame must stay below `max_energy * band_high`.
    pub band_high: f64,
    /// A tone frame must stay above `max_energy * band_floor`.
    pub band_floor: f64,
    /// Shortest accepted tone.
    pub min_tone_ms: u32,
    /// Required share (percent, exclusive) of frames with tone-like zero crossings.
    pub min_tone_percent: f64,
    /// Largest accepted spread between min and max zero crossings.
    pub max_zero_crossing_spread: u32,
    /// Zero-crossing counts per frame that correlate with beep tones.
    pub tone_zero_crossings: Vec<u32>,
    /// After the tone, energy below `min_energy * end_ratio` counts as quiet.
    pub end_ratio: f64,
    /// After the tone, energy below this always counts as quiet.
    pub end_floor: f64,
    /// Quiet time required after the tone before the beep is reported.
    pub trailing_silence_ms: u32,
}

impl Default for BeepConfig {
    fn default() -> Self {
        Self {
            start_energy: 500.0,
            band_low: 0.8,
            band_high: 1.2,
            band_floor: 0.5,
            min_tone_ms: 100,
            min_tone_percent: 90.0,
            max_zero_crossing_spread: 1,
            tone_zero_crossings: vec![6, 8, 9, 10, 14, 16, 17],
            end_ratio: 0.6,
            end_floor: 200.0,
            trailing_silence_ms: 200,
        }
    }
}

impl BeepConfig {
    pub fn validate(&self) -> Result<()> {
        check_energy("beep.startEnergy", self.start_energy)?;
        check_energy("beep.endFloor", self.end_floor)?;
        if !(self.band_low > 0.0 && self.band_low <= 1.0) {
            return Err(AmdError::invalid("beep.bandLow", "must be in (0, 1]"));
        }
        if !(self.band_high >= 1.0 && self.band_high.is_finite()) {
            return Err(AmdError::invalid("beep.bandHigh", "must be >= 1"));
        }
        if !(0.0..1.0).contains(&self.band_floor) {
            return Err(AmdError::invalid("beep.bandFloor", "must be in [0, 1)"));
        }
        if !(0.0..100.0).contains(&self.min_tone_percent) {
            return Err(AmdError::invalid("beep.minTonePercent", "must be in [0, 100)"));
        }
        if !(self.end_ratio > 0.0 && self.end_ratio < 1.0) {
            return Err(AmdError::invalid("beep.endRatio", "must be in (0, 1)"));
        }
        if self.tone_zero_crossings.is_empty() {
            return Err(AmdError::invalid("beep.toneZeroCrossings", "must not be empty"));
        }
        check_positive_ms("beep.minToneMs", self.min_tone_ms)?;
        check_positive_ms("beep.trailingSilenceMs", self.trailing_silence_ms)?;
        Ok(())
    }
}

/// Answering machine detector configuration, including its sub-detectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AmdConfig {
    /// Input sample rate (Hz). Default: 8000.
    pub sample_rate: u32,
    /// Silence longer than this before any voice → no-voice. Default: 2000.
    pub silence_start_ms: u32,
    /// Voice longer than this without a pause → machine. Default: 1100.
    pub machine_ms: u32,
    pub vad: VadConfig,
    pub beep: BeepConfig,
}

impl Default for AmdConfig {
    fn default() -> Self {
        Self {
            sample_rate: MIN_SAMPLE_RATE,
            silence_start_ms: 2_000,
            machine_ms: 1_100,
            vad: VadConfig::default(),
            beep: BeepConfig::default(),
        }
    }
}

impl AmdConfig {
    pub fn validate(&self) -> Result<()> {
        check_sample_rate(self.sample_rate)?;
        check_positive_ms("silenceStartMs", self.silence_start_ms)?;
        check_positive_ms("machineMs", self.machine_ms)?;
        self.vad.validate()?;
        self.beep.validate()
    }

    /// Parse and validate a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&raw)?;
        info!(path = %path.display(), "loaded detector config");
        Ok(config)
    }
}

pub(crate) fn check_sample_rate(sample_rate: u32) -> Result<()> {
    if sample_rate < MIN_SAMPLE_RATE {
        return Err(AmdError::invalid(
            "sampleRate",
            format!("must be >= {MIN_SAMPLE_RATE} (got {sample_rate})"),
        ));
    }
    Ok(())
}

fn check_energy(field: &'static str, value: f64) -> Result<()> {
    if value > 0.0 && value < MAX_ENERGY {
        Ok(())
    } else {
        Err(AmdError::invalid(
            field,
            format!("must be > 0 and < {MAX_ENERGY} (got {value})"),
        ))
    }
}

fn check_positive_ms(field: &'static str, value: u32) -> Result<()> {
    if value == 0 {
        return Err(AmdError::invalid(field, "must be > 0"));
    }
    Ok(())
}

fn check_positive_factor(field: &'static str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(AmdError::invalid(field, format!("must be > 0 (got {value})")))
    }
}
