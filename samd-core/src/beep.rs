//! Greeting-beep detector.
//!
//! A beep is a steady tone: a run of frames whose energy stays inside a
//! narrow band and whose zero-crossing counts are both regular and in the
//! set observed for telephony beeps, followed by a stretch of quiet.
//!
//! ```text
//! WaitForStart ──loud frame──► Collecting ──out of band──► evaluate
//!      ▲                           │                    accepted │ rejected
//!      │                           │                             ▼
//!      └──── loud again ─────── WaitForEnd ──quiet >= trailing──► Done
//! ```
//!
//! A tone rarely ends on a frame boundary, so the frame holding its tail
//! sits between the tone level and the quiet level. `WaitForEnd` lets such
//! fading frames through until quiet begins; once it has, anything that is
//! not quiet is a false positive.
//!
//! `Done` is terminal until [`BeepDetector::reset`]; one beep per call.

use std::fmt;

use tracing::{debug, trace};

use crate::config::BeepConfig;
use crate::engine::{FrameListener, Session};
use crate::error::Result;
use crate::events::{BeepEvent, EventHandler};
use crate::frame::FeatureFrame;

/// Statistics of the tone currently being collected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub start_ms: u32,
    pub min_energy: f64,
    pub max_energy: f64,
    pub min_zero_crossings: u32,
    pub max_zero_crossings: u32,
    /// Frames whose zero-crossing count is in the beep-like set.
    pub tone_frames: u32,
    pub other_frames: u32,
}

impl Candidate {
    fn start(frame: &FeatureFrame, config: &BeepConfig) -> Self {
        let mut candidate = Self {
            start_ms: frame.time_ms,
            min_energy: frame.energy,
            max_energy: frame.energy,
            min_zero_crossings: frame.zero_crossings,
            max_zero_crossings: frame.zero_crossings,
            tone_frames: 0,
            other_frames: 0,
        };
        candidate.count(frame.zero_crossings, config);
        candidate
    }

    fn in_band(&self, energy: f64, config: &BeepConfig) -> bool {
        energy > self.min_energy * config.band_low
            && energy < self.max_energy * config.band_high
            && energy > self.max_energy * config.band_floor
    }

    fn extend(&mut self, frame: &FeatureFrame, config: &BeepConfig) {
        self.min_energy = self.min_energy.min(frame.energy);
        self.max_energy = self.max_energy.max(frame.energy);
        self.min_zero_crossings = self.min_zero_crossings.min(frame.zero_crossings);
        self.max_zero_crossings = self.max_zero_crossings.max(frame.zero_crossings);
        self.count(frame.zero_crossings, config);
    }

    fn count(&mut self, zero_crossings: u32, config: &BeepConfig) {
        if config.tone_zero_crossings.contains(&zero_crossings) {
            self.tone_frames += 1;
        } else {
            self.other_frames += 1;
        }
    }

    /// Share of beep-like frames, in percent.
    pub fn tone_percent(&self) -> f64 {
        let total = self.tone_frames + self.other_frames;
        if total == 0 {
            return 0.0;
        }
        f64::from(self.tone_frames) / f64::from(total) * 100.0
    }

    pub fn regularity(&self) -> u32 {
        self.max_zero_crossings - self.min_zero_crossings
    }

    /// Whether the tone ending at `end_ms` qualifies as a beep.
    pub fn accepts(&self, end_ms: u32, config: &BeepConfig) -> bool {
        let duration = end_ms.saturating_sub(self.start_ms);
        duration >= config.min_tone_ms
            && self.tone_percent() > config.min_tone_percent
            && self.regularity() <= config.max_zero_crossing_spread
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum BeepStage {
    #[default]
    WaitForStart,
    Collecting(Candidate),
    /// Tone accepted; measuring the quiet that must follow it.
    WaitForEnd {
        tone_end_ms: u32,
        min_energy: f64,
        /// First quiet frame after the tone.
        quiet_since_ms: Option<u32>,
    },
    Done,
}

/// One detector step. Returns the next stage and the event, if the beep was
/// confirmed on this frame.
pub fn transition(
    stage: BeepStage,
    frame: &FeatureFrame,
    config: &BeepConfig,
) -> (BeepStage, Option<BeepEvent>) {
    match stage {
        BeepStage::Done => (BeepStage::Done, None),
        BeepStage::WaitForStart => (wait_for_start(frame, config), None),
        BeepStage::Collecting(mut candidate) => {
            if candidate.in_band(frame.energy, config) {
                candidate.extend(frame, config);
                return (BeepStage::Collecting(candidate), None);
            }
            if candidate.accepts(frame.time_ms, config) {
                debug!(
                    time_ms = frame.time_ms,
                    start_ms = candidate.start_ms,
                    tone_percent = candidate.tone_percent(),
                    regularity = candidate.regularity(),
                    min_energy = candidate.min_energy,
                    "beep tone accepted, waiting for end"
                );
                let waiting = BeepStage::WaitForEnd {
                    tone_end_ms: frame.time_ms,
                    min_energy: candidate.min_energy,
                    quiet_since_ms: None,
                };
                transition(waiting, frame, config)
            } else {
                trace!(
                    time_ms = frame.time_ms,
                    start_ms = candidate.start_ms,
                    tone_percent = candidate.tone_percent(),
                    regularity = candidate.regularity(),
                    "beep candidate rejected"
                );
                (wait_for_start(frame, config), None)
            }
        }
        BeepStage::WaitForEnd {
            tone_end_ms,
            min_energy,
            quiet_since_ms,
        } => {
            let quiet =
                frame.energy < min_energy * config.end_ratio || frame.energy < config.end_floor;
            if quiet {
                let since = quiet_since_ms.unwrap_or(frame.time_ms);
                if frame.time_ms.saturating_sub(since) >= config.trailing_silence_ms {
                    debug!(time_ms = frame.time_ms, "beep detected");
                    return (BeepStage::Done, Some(BeepEvent { time_ms: frame.time_ms }));
                }
                let waiting = BeepStage::WaitForEnd {
                    tone_end_ms,
                    min_energy,
                    quiet_since_ms: Some(since),
                };
                return (waiting, None);
            }

            let fading = quiet_since_ms.is_none()
                && frame.energy < min_energy * config.band_low
                && frame.time_ms.saturating_sub(tone_end_ms) < config.trailing_silence_ms;
            if fading {
                trace!(time_ms = frame.time_ms, energy = frame.energy, "beep tail");
                let waiting = BeepStage::WaitForEnd {
                    tone_end_ms,
                    min_energy,
                    quiet_since_ms,
                };
                return (waiting, None);
            }

            debug!(
                time_ms = frame.time_ms,
                energy = frame.energy,
                "beep end not quiet, false positive"
            );
            (wait_for_start(frame, config), None)
        }
    }
}

fn wait_for_start(frame: &FeatureFrame, config: &BeepConfig) -> BeepStage {
    if frame.energy > config.start_energy {
        BeepStage::Collecting(Candidate::start(frame, config))
    } else {
        BeepStage::WaitForStart
    }
}

/// Per-stream beep detector.
pub struct BeepDetector {
    config: BeepConfig,
    stage: BeepStage,
    handler: Option<EventHandler<BeepEvent>>,
}

impl BeepDetector {
    pub fn new(config: BeepConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stage: BeepStage::WaitForStart,
            handler: None,
        })
    }

    pub fn set_event_handler(&mut self, handler: impl FnMut(&BeepEvent) + 'static) {
        self.handler = Some(Box::new(handler));
    }

    pub fn clear_event_handler(&mut self) {
        self.handler = None;
    }

    pub fn config(&self) -> &BeepConfig {
        &self.config
    }

    /// Replace the tunables. The current stage is kept.
    pub fn set_config(&mut self, config: BeepConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn stage(&self) -> &BeepStage {
        &self.stage
    }

    pub fn is_done(&self) -> bool {
        self.stage == BeepStage::Done
    }

    pub fn process_frame(&mut self, frame: &FeatureFrame) -> Option<BeepEvent> {
        let stage = std::mem::take(&mut self.stage);
        let (stage, event) = transition(stage, frame, &self.config);
        self.stage = stage;
        if let (Some(event), Some(handler)) = (event.as_ref(), self.handler.as_mut()) {
            handler(event);
        }
        event
    }

    /// Re-arm the detector, e.g. to look for a second beep.
    pub fn reset(&mut self) {
        self.stage = BeepStage::WaitForStart;
    }
}

impl fmt::Debug for BeepDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeepDetector")
            .field("stage", &self.stage)
            .field("has_handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}

impl FrameListener for BeepDetector {
    fn on_frame(&mut self, frame: &FeatureFrame) {
        self.process_frame(frame);
    }

    fn reset(&mut self) {
        BeepDetector::reset(self);
    }
}

/// Standalone beep detector that consumes PCM directly.
pub type Beep = Session<BeepDetector>;

impl Session<BeepDetector> {
    pub fn new(sample_rate: u32, config: BeepConfig) -> Result<Self> {
        Session::with_listener(sample_rate, BeepDetector::new(config)?)
    }
}
