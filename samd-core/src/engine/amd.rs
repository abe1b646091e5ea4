//! Answering machine detection.
//!
//! ## State machine
//!
//! ```text
//!                 silence >= silence_start_ms
//! WaitForVoice ─────────────────────────────────────────────► Done (NO VOICE)
//!      │ voice
//!      ▼           silence begins
//!   Detect ──────────────────────────► HumanDetected   (HUMAN VOICE / HUMAN SILENCE)
//!      │ voice >= machine_ms
//!      ▼
//! MachineDetected                                       (MACHINE VOICE / MACHINE SILENCE)
//!
//! A beep in any state but Done ──► MachineDetected (MACHINE BEEP)
//! ```
//!
//! `AmdClassifier` fans each frame out to the beep detector first and the
//! VAD second, then feeds their events to [`transition`]. All times are the
//! frame clock, so results do not depend on wall time or buffer sizes.

use std::fmt;

use tracing::debug;

use super::{FrameListener, Session};
use crate::beep::BeepDetector;
use crate::config::{AmdConfig, BeepConfig, VadConfig};
use crate::error::{AmdError, Result};
use crate::events::{
    AmdEvent, AmdEventKind, BeepEvent, Disposition, EventHandler, VadEvent, VadEventKind,
};
use crate::frame::FeatureFrame;
use crate::vad::VoiceDetector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmdState {
    #[default]
    WaitForVoice,
    Detect,
    HumanDetected,
    MachineDetected,
    Done,
}

/// State plus the time it was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AmdMachine {
    pub state: AmdState,
    pub state_begin_ms: u32,
}

impl AmdMachine {
    fn enter(state: AmdState, time_ms: u32) -> Self {
        Self {
            state,
            state_begin_ms: time_ms,
        }
    }
}

/// Input to one state machine step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmdInput {
    Vad(VadEvent),
    Beep(BeepEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmdTiming {
    pub silence_start_ms: u32,
    pub machine_ms: u32,
}

impl From<&AmdConfig> for AmdTiming {
    fn from(config: &AmdConfig) -> Self {
        Self {
            silence_start_ms: config.silence_start_ms,
            machine_ms: config.machine_ms,
        }
    }
}

/// One state machine step.
pub fn transition(
    machine: AmdMachine,
    input: AmdInput,
    timing: &AmdTiming,
) -> (AmdMachine, Option<AmdEvent>) {
    let event = |kind, time_ms| Some(AmdEvent { kind, time_ms });

    let vad = match input {
        AmdInput::Beep(_) if machine.state == AmdState::Done => return (machine, None),
        AmdInput::Beep(beep) => {
            debug!(
                time_ms = beep.time_ms,
                from = ?machine.state,
                "beep, transition to MACHINE DETECTED"
            );
            return (
                AmdMachine::enter(AmdState::MachineDetected, beep.time_ms),
                event(AmdEventKind::MachineBeep, beep.time_ms),
            );
        }
        AmdInput::Vad(vad) => vad,
    };
    let now = vad.time_ms;

    match (machine.state, vad.kind) {
        (AmdState::WaitForVoice, VadEventKind::Silence | VadEventKind::SilenceBegin) => {
            if now.saturating_sub(machine.state_begin_ms) >= timing.silence_start_ms {
                debug!(time_ms = now, "no voice, transition to DONE");
                (AmdMachine::enter(AmdState::Done, now), event(AmdEventKind::NoVoice, now))
            } else {
                (machine, None)
            }
        }
        (AmdState::WaitForVoice, VadEventKind::Voice | VadEventKind::VoiceBegin) => {
            debug!(time_ms = now, "start of voice, transition to DETECT");
            (AmdMachine::enter(AmdState::Detect, now), None)
        }
        (AmdState::Detect, VadEventKind::Silence | VadEventKind::SilenceBegin) => {
            debug!(time_ms = now, "silence, transition to HUMAN DETECTED");
            (
                AmdMachine::enter(AmdState::HumanDetected, now),
                event(AmdEventKind::HumanSilence, now),
            )
        }
        (AmdState::Detect, VadEventKind::Voice | VadEventKind::VoiceBegin) => {
            let voiced = now
                .saturating_sub(machine.state_begin_ms)
                .saturating_sub(vad.transition_ms);
            if voiced >= timing.machine_ms {
                debug!(
                    time_ms = now,
                    voiced,
                    "exceeded machine ms, transition to MACHINE DETECTED"
                );
                (
                    AmdMachine::enter(AmdState::MachineDetected, now),
                    event(AmdEventKind::MachineVoice, now),
                )
            } else {
                (machine, None)
            }
        }
        (AmdState::HumanDetected, VadEventKind::VoiceBegin) => {
            (machine, event(AmdEventKind::HumanVoice, now))
        }
        (AmdState::HumanDetected, VadEventKind::SilenceBegin) => {
            (machine, event(AmdEventKind::HumanSilence, now))
        }
        (AmdState::MachineDetected, VadEventKind::VoiceBegin) => {
            (machine, event(AmdEventKind::MachineVoice, now))
        }
        (AmdState::MachineDetected, VadEventKind::SilenceBegin) => {
            (machine, event(AmdEventKind::MachineSilence, now))
        }
        (AmdState::HumanDetected | AmdState::MachineDetected | AmdState::Done, _) => {
            (machine, None)
        }
    }
}

/// Frame listener combining beep detection, VAD and the AMD state machine.
pub struct AmdClassifier {
    vad: VoiceDetector,
    beep: BeepDetector,
    timing: AmdTiming,
    machine: AmdMachine,
    disposition: Disposition,
    handler: Option<EventHandler<AmdEvent>>,
}

impl AmdClassifier {
    pub fn new(config: &AmdConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            vad: VoiceDetector::new(config.vad.clone())?,
            beep: BeepDetector::new(config.beep.clone())?,
            timing: AmdTiming::from(config),
            machine: AmdMachine::default(),
            disposition: Disposition::Unknown,
            handler: None,
        })
    }

    pub fn set_event_handler(&mut self, handler: impl FnMut(&AmdEvent) + 'static) {
        self.handler = Some(Box::new(handler));
    }

    pub fn clear_event_handler(&mut self) {
        self.handler = None;
    }

    pub fn vad(&self) -> &VoiceDetector {
        &self.vad
    }

    pub fn vad_mut(&mut self) -> &mut VoiceDetector {
        &mut self.vad
    }

    pub fn beep(&self) -> &BeepDetector {
        &self.beep
    }

    pub fn beep_mut(&mut self) -> &mut BeepDetector {
        &mut self.beep
    }

    pub fn state(&self) -> AmdState {
        self.machine.state
    }

    pub fn machine(&self) -> AmdMachine {
        self.machine
    }

    pub fn timing(&self) -> AmdTiming {
        self.timing
    }

    /// Classification implied by the most recent AMD event.
    pub fn disposition(&self) -> Disposition {
        self.disposition
    }

    /// Longest silence tolerated before any voice.
    pub fn set_silence_start_ms(&mut self, ms: u32) -> Result<()> {
        if ms == 0 {
            return Err(AmdError::invalid("silenceStartMs", "must be > 0"));
        }
        self.timing.silence_start_ms = ms;
        Ok(())
    }

    /// Unbroken voice needed to call a machine.
    pub fn set_machine_ms(&mut self, ms: u32) -> Result<()> {
        if ms == 0 {
            return Err(AmdError::invalid("machineMs", "must be > 0"));
        }
        self.timing.machine_ms = ms;
        Ok(())
    }

    fn apply(&mut self, input: AmdInput) -> Option<AmdEvent> {
        let (machine, event) = transition(self.machine, input, &self.timing);
        if machine.state != self.machine.state {
            debug!(from = ?self.machine.state, to = ?machine.state, "amd state change");
        }
        self.machine = machine;

        let event = event?;
        self.disposition = event.kind.disposition();
        debug!(time_ms = event.time_ms, "{}", event.kind);
        if let Some(handler) = self.handler.as_mut() {
            handler(&event);
        }
        Some(event)
    }
}

impl fmt::Debug for AmdClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmdClassifier")
            .field("machine", &self.machine)
            .field("timing", &self.timing)
            .field("disposition", &self.disposition)
            .field("vad", &self.vad)
            .field("beep", &self.beep)
            .finish_non_exhaustive()
    }
}

impl FrameListener for AmdClassifier {
    fn on_frame(&mut self, frame: &FeatureFrame) {
        if let Some(beep) = self.beep.process_frame(frame) {
            self.apply(AmdInput::Beep(beep));
        }
        let vad = self.vad.process_frame(frame);
        self.apply(AmdInput::Vad(vad));
    }

    fn reset(&mut self) {
        self.vad.reset();
        self.beep.reset();
        self.machine = AmdMachine::default();
        self.disposition = Disposition::Unknown;
    }
}

/// Answering machine detector for one call.
///
/// ```
/// use samd_core::{Amd, AmdConfig, Disposition};
///
/// let mut amd = Amd::new(AmdConfig::default()).unwrap();
/// // 2 s of dead air.
/// for _ in 0..200 {
///     amd.process_buffer(&[0; 80], 1).unwrap();
/// }
/// assert_eq!(amd.disposition(), Disposition::NoVoice);
/// ```
pub type Amd = Session<AmdClassifier>;

impl Session<AmdClassifier> {
    pub fn new(config: AmdConfig) -> Result<Self> {
        let classifier = AmdClassifier::new(&config)?;
        Session::with_listener(config.sample_rate, classifier)
    }

    pub fn set_event_handler(&mut self, handler: impl FnMut(&AmdEvent) + 'static) {
        self.listener.set_event_handler(handler);
    }

    pub fn vad(&self) -> &VoiceDetector {
        self.listener().vad()
    }

    /// The embedded VAD, for fine tuning and its event handler.
    pub fn vad_mut(&mut self) -> Result<&mut VoiceDetector> {
        Ok(self.listener_mut()?.vad_mut())
    }

    pub fn beep(&self) -> &BeepDetector {
        self.listener().beep()
    }

    pub fn beep_mut(&mut self) -> Result<&mut BeepDetector> {
        Ok(self.listener_mut()?.beep_mut())
    }

    pub fn set_vad_config(&mut self, config: VadConfig) -> Result<()> {
        self.listener_mut()?.vad_mut().set_config(config)
    }

    pub fn set_beep_config(&mut self, config: BeepConfig) -> Result<()> {
        self.listener_mut()?.beep_mut().set_config(config)
    }

    pub fn set_silence_start_ms(&mut self, ms: u32) -> Result<()> {
        self.listener_mut()?.set_silence_start_ms(ms)
    }

    pub fn set_machine_ms(&mut self, ms: u32) -> Result<()> {
        self.listener_mut()?.set_machine_ms(ms)
    }

    pub fn state(&self) -> AmdState {
        self.listener().state()
    }

    pub fn disposition(&self) -> Disposition {
        self.listener().disposition()
    }
}
