//! `Session`: per-stream lifecycle around a frame listener.
//!
//! ## Lifecycle
//!
//! ```text
//! Amd::new / Vad::new / Beep::new  → analyzer at the configured rate, listener armed
//!     └─► process_buffer(..)       → frames fanned out synchronously, any number of calls
//!         └─► release()            → further process_buffer calls return Released
//! ```
//!
//! `release()` is idempotent. Every event produced by a buffer has been
//! delivered to its handler before `process_buffer` returns.
//!
//! ## Threading
//!
//! None. A session belongs to one audio stream and is driven from one
//! thread; handlers are plain `FnMut` closures, so sessions are `!Send`.

pub mod amd;

use tracing::{debug, info};

use crate::{
    config::check_sample_rate,
    error::{AmdError, Result},
    frame::{FeatureFrame, FrameAnalyzer},
};

/// Anything that consumes feature frames.
///
/// Implemented by every detector. Composite detectors call their parts in a
/// fixed order from their own `on_frame`.
pub trait FrameListener {
    fn on_frame(&mut self, frame: &FeatureFrame);

    /// Return to the state of a freshly created listener.
    fn reset(&mut self);
}

/// A frame analyzer driving one listener, with a release flag.
#[derive(Debug)]
pub struct Session<L> {
    analyzer: FrameAnalyzer,
    listener: L,
    released: bool,
}

impl<L: FrameListener> Session<L> {
    /// Wrap `listener`, analysing `sample_rate` Hz input.
    pub fn with_listener(sample_rate: u32, listener: L) -> Result<Self> {
        check_sample_rate(sample_rate)?;
        debug!(sample_rate, "session created");
        Ok(Self {
            analyzer: FrameAnalyzer::new(sample_rate),
            listener,
            released: false,
        })
    }

    /// Feed interleaved 16-bit PCM. Buffers may be any length and need not
    /// align with frames or sample sets.
    pub fn process_buffer(&mut self, samples: &[i16], channels: u16) -> Result<()> {
        self.ensure_live()?;
        if channels == 0 {
            return Err(AmdError::InvalidChannelCount);
        }
        for frame in self.analyzer.frames(samples, channels) {
            self.listener.on_frame(&frame);
        }
        Ok(())
    }

    /// Change the input rate. Restarts the frame clock and the listener.
    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<()> {
        self.ensure_live()?;
        check_sample_rate(sample_rate)?;
        self.analyzer = FrameAnalyzer::new(sample_rate);
        self.listener.reset();
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.analyzer.sample_rate()
    }

    /// Stream time of the last completed frame.
    pub fn time_ms(&self) -> u32 {
        self.analyzer.time_ms()
    }

    pub fn analyzer(&self) -> &FrameAnalyzer {
        &self.analyzer
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    /// Mutable access for tuning and handlers. Fails once released.
    pub fn listener_mut(&mut self) -> Result<&mut L> {
        self.ensure_live()?;
        Ok(&mut self.listener)
    }

    /// Start over on a new stream with the same configuration and handlers.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.analyzer = FrameAnalyzer::new(self.analyzer.sample_rate());
        self.listener.reset();
        Ok(())
    }

    /// Stop accepting audio.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            info!(time_ms = self.analyzer.time_ms(), "session released");
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Consume the session, returning the listener.
    pub fn into_listener(self) -> L {
        self.listener
    }

    fn ensure_live(&self) -> Result<()> {
        if self.released {
            Err(AmdError::Released)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        frames: Vec<u32>,
        resets: u32,
    }

    impl FrameListener for Recorder {
        fn on_frame(&mut self, frame: &FeatureFrame) {
            self.frames.push(frame.time_ms);
        }

        fn reset(&mut self) {
            self.frames.clear();
            self.resets += 1;
        }
    }

    #[test]
    fn frames_reach_listener_in_order() {
        let mut session = Session::with_listener(8_000, Recorder::default()).expect("session");
        session.process_buffer(&[0; 200], 1).expect("process");
        session.process_buffer(&[0; 40], 1).expect("process");
        assert_eq!(session.listener().frames, vec![10, 20, 30]);
        assert_eq!(session.time_ms(), 30);
    }

    #[test]
    fn rejects_low_sample_rate() {
        assert!(matches!(
            Session::with_listener(4_000, Recorder::default()),
            Err(AmdError::InvalidConfig { field: "sampleRate", .. })
        ));
    }

    #[test]
    fn zero_channels_is_an_error() {
        let mut session = Session::with_listener(8_000, Recorder::default()).expect("session");
        assert!(matches!(
            session.process_buffer(&[0; 80], 0),
            Err(AmdError::InvalidChannelCount)
        ));
    }

    #[test]
    fn released_session_refuses_audio() {
        let mut session = Session::with_listener(8_000, Recorder::default()).expect("session");
        session.release();
        session.release();
        assert!(session.is_released());
        assert!(matches!(
            session.process_buffer(&[0; 80], 1),
            Err(AmdError::Released)
        ));
        assert!(matches!(session.set_sample_rate(16_000), Err(AmdError::Released)));
        assert!(matches!(session.listener_mut(), Err(AmdError::Released)));
        assert!(matches!(session.reset(), Err(AmdError::Released)));
    }

    #[test]
    fn sample_rate_change_resets_listener() {
        let mut session = Session::with_listener(8_000, Recorder::default()).expect("session");
        session.process_buffer(&[0; 80], 1).expect("process");
        session.set_sample_rate(16_000).expect("valid rate");
        assert_eq!(session.sample_rate(), 16_000);
        assert_eq!(session.listener().resets, 1);
        assert!(session.listener().frames.is_empty());

        session.process_buffer(&[0; 160], 1).expect("process");
        assert_eq!(session.listener().frames, vec![10]);
    }
}
