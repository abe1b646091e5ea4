//! Voice Activity Detection (VAD).
//!
//! `VoiceDetector` classifies every feature frame with an adaptive energy
//! threshold (see [`energy`]) and smooths the decisions with hysteresis: a
//! state change needs `voice_ms` of contiguous voice, or `silence_ms` of
//! contiguous silence. A single opposite frame resets the timer.
//!
//! The hysteresis step is the pure function [`transition`]; the detector
//! only adds bookkeeping and event delivery around it.

pub mod energy;

use std::fmt;

use tracing::{debug, trace};

use crate::config::VadConfig;
use crate::engine::{FrameListener, Session};
use crate::error::Result;
use crate::events::{EventHandler, VadEvent, VadEventKind};
use crate::frame::{FeatureFrame, MS_PER_FRAME};

pub use energy::AdaptiveThreshold;

/// Whether a single frame looks like voice or silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    /// Frame energy above threshold.
    Voice,
    /// Frame energy at or below threshold.
    Silence,
}

impl VadDecision {
    pub fn is_voice(self) -> bool {
        self == VadDecision::Voice
    }
}

/// Committed VAD state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VadState {
    #[default]
    Silence,
    Voice,
}

/// One hysteresis step.
///
/// Returns the new state, the new transition timer and the kind of event to
/// emit for this frame.
pub fn transition(
    state: VadState,
    transition_ms: u32,
    decision: VadDecision,
    config: &VadConfig,
) -> (VadState, u32, VadEventKind) {
    match state {
        VadState::Silence => {
            let timer = if decision.is_voice() {
                transition_ms + MS_PER_FRAME
            } else {
                0
            };
            if timer >= config.voice_ms {
                (VadState::Voice, 0, VadEventKind::VoiceBegin)
            } else {
                (VadState::Silence, timer, VadEventKind::Silence)
            }
        }
        VadState::Voice => {
            let timer = if decision.is_voice() {
                0
            } else {
                transition_ms + MS_PER_FRAME
            };
            if timer >= config.silence_ms {
                (VadState::Silence, 0, VadEventKind::SilenceBegin)
            } else {
                (VadState::Voice, timer, VadEventKind::Voice)
            }
        }
    }
}

/// Per-stream voice activity detector.
pub struct VoiceDetector {
    config: VadConfig,
    threshold: AdaptiveThreshold,
    state: VadState,
    transition_ms: u32,
    total_voice_ms: u32,
    first_voice_ms: Option<u32>,
    handler: Option<EventHandler<VadEvent>>,
}

impl VoiceDetector {
    /// Create a detector. Fails if `config` is out of range.
    pub fn new(config: VadConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            threshold: AdaptiveThreshold::new(&config),
            config,
            state: VadState::Silence,
            transition_ms: 0,
            total_voice_ms: 0,
            first_voice_ms: None,
            handler: None,
        })
    }

    /// Register the handler that receives every `VadEvent`.
    pub fn set_event_handler(&mut self, handler: impl FnMut(&VadEvent) + 'static) {
        self.handler = Some(Box::new(handler));
    }

    pub fn clear_event_handler(&mut self) {
        self.handler = None;
    }

    pub fn config(&self) -> &VadConfig {
        &self.config
    }

    pub fn state(&self) -> VadState {
        self.state
    }

    /// Current (possibly adapted) energy threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold.value()
    }

    pub fn total_voice_ms(&self) -> u32 {
        self.total_voice_ms
    }

    /// Stream time of the first silence → voice transition.
    pub fn first_voice_ms(&self) -> Option<u32> {
        self.first_voice_ms
    }

    /// Replace all tunables. The threshold restarts from `energy_threshold`.
    pub fn set_config(&mut self, config: VadConfig) -> Result<()> {
        config.validate()?;
        self.threshold.reconfigure(&config);
        self.threshold.set_value(config.energy_threshold);
        self.config = config;
        Ok(())
    }

    /// Set the energy threshold; also replaces any adapted value.
    pub fn set_energy_threshold(&mut self, threshold: f64) -> Result<()> {
        self.update(|c| c.energy_threshold = threshold)?;
        self.threshold.set_value(threshold);
        Ok(())
    }

    pub fn set_max_energy_threshold(&mut self, threshold: f64) -> Result<()> {
        self.update(|c| c.max_energy_threshold = threshold)
    }

    pub fn set_voice_ms(&mut self, ms: u32) -> Result<()> {
        self.update(|c| c.voice_ms = ms)
    }

    pub fn set_silence_ms(&mut self, ms: u32) -> Result<()> {
        self.update(|c| c.silence_ms = ms)
    }

    /// 0 disables the initial adjustment.
    pub fn set_initial_adjust_ms(&mut self, ms: u32) -> Result<()> {
        self.update(|c| c.initial_adjust_ms = ms)
    }

    /// 0 disables the post-voice adjustment.
    pub fn set_voice_adjust_ms(&mut self, ms: u32) -> Result<()> {
        self.update(|c| c.voice_adjust_ms = ms)
    }

    pub fn set_adjust_limit(&mut self, limit: f64) -> Result<()> {
        self.update(|c| c.adjust_limit = limit)
    }

    /// Classify one frame, advance the state machine and emit its event.
    pub fn process_frame(&mut self, frame: &FeatureFrame) -> VadEvent {
        let decision = self.threshold.observe(frame, self.first_voice_ms);
        if decision.is_voice() {
            self.total_voice_ms += MS_PER_FRAME;
        }

        let (state, transition_ms, kind) =
            transition(self.state, self.transition_ms, decision, &self.config);
        self.state = state;
        self.transition_ms = transition_ms;

        match kind {
            VadEventKind::VoiceBegin => {
                if self.first_voice_ms.is_none() {
                    self.first_voice_ms = Some(frame.time_ms);
                }
                debug!(
                    time_ms = frame.time_ms,
                    total_voice_ms = self.total_voice_ms,
                    "voice detected"
                );
            }
            VadEventKind::SilenceBegin => {
                debug!(
                    time_ms = frame.time_ms,
                    total_voice_ms = self.total_voice_ms,
                    "silence detected"
                );
            }
            VadEventKind::Silence | VadEventKind::Voice => {
                trace!(
                    time_ms = frame.time_ms,
                    energy = frame.energy,
                    transition_ms,
                    zero_crossings = frame.zero_crossings,
                    total_voice_ms = self.total_voice_ms,
                    "{kind}"
                );
            }
        }

        let event = VadEvent {
            kind,
            time_ms: frame.time_ms,
            total_voice_ms: self.total_voice_ms,
            transition_ms,
        };
        if let Some(handler) = self.handler.as_mut() {
            handler(&event);
        }
        event
    }

    /// Back to the initial state: silence, configured threshold, no voice seen.
    pub fn reset(&mut self) {
        self.threshold = AdaptiveThreshold::new(&self.config);
        self.state = VadState::Silence;
        self.transition_ms = 0;
        self.total_voice_ms = 0;
        self.first_voice_ms = None;
    }

    fn update(&mut self, apply: impl FnOnce(&mut VadConfig)) -> Result<()> {
        let mut next = self.config.clone();
        apply(&mut next);
        next.validate()?;
        self.threshold.reconfigure(&next);
        self.config = next;
        Ok(())
    }
}

impl fmt::Debug for VoiceDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceDetector")
            .field("state", &self.state)
            .field("threshold", &self.threshold.value())
            .field("transition_ms", &self.transition_ms)
            .field("total_voice_ms", &self.total_voice_ms)
            .finish_non_exhaustive()
    }
}

impl FrameListener for VoiceDetector {
    fn on_frame(&mut self, frame: &FeatureFrame) {
        self.process_frame(frame);
    }

    fn reset(&mut self) {
        VoiceDetector::reset(self);
    }
}

/// Standalone VAD that consumes PCM directly.
pub type Vad = Session<VoiceDetector>;

impl Session<VoiceDetector> {
    /// Create a standalone VAD for `sample_rate` Hz input.
    pub fn new(sample_rate: u32, config: VadConfig) -> Result<Self> {
        Session::with_listener(sample_rate, VoiceDetector::new(config)?)
    }
}
