//! Event types delivered to registered handlers.
//!
//! | Event | Producer | Handler registration |
//! |-------|----------|----------------------|
//! | `VadEvent` | `VoiceDetector` | `VoiceDetector::set_event_handler` |
//! | `BeepEvent` | `BeepDetector` | `BeepDetector::set_event_handler` |
//! | `AmdEvent` | `AmdClassifier` | `AmdClassifier::set_event_handler` |
//!
//! All types are serde-serialisable so hosts can forward them as JSON.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Handler invoked synchronously for every event a detector emits.
///
/// Whatever the closure captures is the caller's context for the stream.
pub type EventHandler<E> = Box<dyn FnMut(&E)>;

// ---------------------------------------------------------------------------
// VAD events
// ---------------------------------------------------------------------------

/// Kind of a per-frame VAD event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VadEventKind {
    /// Transition from voice to silence on this frame.
    SilenceBegin,
    /// Still in silence (possibly accumulating voice toward a transition).
    Silence,
    /// Transition from silence to voice on this frame.
    VoiceBegin,
    /// Still in voice (possibly accumulating silence toward a transition).
    Voice,
}

impl VadEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VadEventKind::SilenceBegin => "VAD SILENCE BEGIN",
            VadEventKind::Silence => "VAD SILENCE",
            VadEventKind::VoiceBegin => "VAD VOICE BEGIN",
            VadEventKind::Voice => "VAD VOICE",
        }
    }

    pub fn is_voice(self) -> bool {
        matches!(self, VadEventKind::VoiceBegin | VadEventKind::Voice)
    }

    pub fn is_begin(self) -> bool {
        matches!(self, VadEventKind::VoiceBegin | VadEventKind::SilenceBegin)
    }
}

impl fmt::Display for VadEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted by the VAD once per feature frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VadEvent {
    pub kind: VadEventKind,
    /// Frame time (ms since stream start).
    pub time_ms: u32,
    /// Cumulative duration of voice-classified frames so far.
    pub total_voice_ms: u32,
    /// Contiguous time spent classified opposite to the current state.
    /// Always 0 on `*Begin` events.
    pub transition_ms: u32,
}

// ---------------------------------------------------------------------------
// Beep events
// ---------------------------------------------------------------------------

/// Emitted once per session when a greeting beep has been confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeepEvent {
    /// Frame time at which the trailing silence completed.
    pub time_ms: u32,
}

// ---------------------------------------------------------------------------
// AMD events
// ---------------------------------------------------------------------------

/// Call classification emitted by the answering machine detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmdEventKind {
    /// No speech before the wait-for-voice timeout.
    NoVoice,
    MachineVoice,
    MachineSilence,
    MachineBeep,
    HumanVoice,
    HumanSilence,
}

impl AmdEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AmdEventKind::NoVoice => "NO VOICE",
            AmdEventKind::MachineVoice => "MACHINE VOICE",
            AmdEventKind::MachineSilence => "MACHINE SILENCE",
            AmdEventKind::MachineBeep => "MACHINE BEEP",
            AmdEventKind::HumanVoice => "HUMAN VOICE",
            AmdEventKind::HumanSilence => "HUMAN SILENCE",
        }
    }

    /// Call disposition implied by this event.
    pub fn disposition(self) -> Disposition {
        match self {
            AmdEventKind::NoVoice => Disposition::NoVoice,
            AmdEventKind::MachineVoice
            | AmdEventKind::MachineSilence
            | AmdEventKind::MachineBeep => Disposition::Machine,
            AmdEventKind::HumanVoice | AmdEventKind::HumanSilence => Disposition::Human,
        }
    }
}

impl fmt::Display for AmdEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted by the AMD state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmdEvent {
    pub kind: AmdEventKind,
    /// Frame time at which the classification was made.
    pub time_ms: u32,
}

/// Final answer for a call, as reported by hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Disposition {
    /// No classification event has been seen yet.
    #[default]
    Unknown,
    Human,
    Machine,
    NoVoice,
}

impl Disposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Unknown => "unknown",
            Disposition::Human => "human",
            Disposition::Machine => "machine",
            Disposition::NoVoice => "no-voice",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
