//! Adaptive energy threshold with a hard ceiling.
//!
//! ## Algorithm
//!
//! 1. Until `initial_adjust_ms` has passed, only frames louder than the
//!    ceiling (`max_threshold`) count as voice; the background level is
//!    still being sampled.
//! 2. Afterwards a frame is voice when its energy is above `threshold`, or
//!    above the ceiling regardless.
//! 3. On the first frame at or after `initial_adjust_ms`, and again on the
//!    first frame at or after `first_voice + voice_adjust_ms`, the threshold
//!    is recomputed as
//!    `min(average_energy * multiplier, threshold * limit, max_threshold)`
//!    and only ever raised.

use tracing::debug;

use super::VadDecision;
use crate::config::VadConfig;
use crate::frame::FeatureFrame;

#[derive(Debug, Clone)]
pub struct AdaptiveThreshold {
    threshold: f64,
    max_threshold: f64,
    initial_adjust_ms: u32,
    voice_adjust_ms: u32,
    adjust_limit: f64,
    adjust_multiplier: f64,
    initial_adjusted: bool,
    voice_adjusted: bool,
}

impl AdaptiveThreshold {
    pub fn new(config: &VadConfig) -> Self {
        Self {
            threshold: config.energy_threshold,
            max_threshold: config.max_energy_threshold,
            initial_adjust_ms: config.initial_adjust_ms,
            voice_adjust_ms: config.voice_adjust_ms,
            adjust_limit: config.adjust_limit,
            adjust_multiplier: config.adjust_multiplier,
            initial_adjusted: false,
            voice_adjusted: false,
        }
    }

    /// Current threshold.
    pub fn value(&self) -> f64 {
        self.threshold
    }

    pub fn max_threshold(&self) -> f64 {
        self.max_threshold
    }

    /// Replace the threshold outright (explicit tuning, may lower it).
    pub fn set_value(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    /// Pick up changed tuning parameters, keeping the current threshold and
    /// which adjustments already happened.
    pub fn reconfigure(&mut self, config: &VadConfig) {
        self.max_threshold = config.max_energy_threshold;
        self.initial_adjust_ms = config.initial_adjust_ms;
        self.voice_adjust_ms = config.voice_adjust_ms;
        self.adjust_limit = config.adjust_limit;
        self.adjust_multiplier = config.adjust_multiplier;
    }

    /// Run any due adjustment, then classify the frame.
    pub fn observe(&mut self, frame: &FeatureFrame, first_voice_ms: Option<u32>) -> VadDecision {
        if self.initial_adjust_due(frame.time_ms) {
            self.initial_adjusted = true;
            self.adjust(frame.time_ms, frame.average_energy);
        }
        if self.voice_adjust_due(frame.time_ms, first_voice_ms) {
            self.voice_adjusted = true;
            self.adjust(frame.time_ms, frame.average_energy);
        }
        self.classify(frame.time_ms, frame.energy)
    }

    /// Voice/silence decision for one frame without side effects.
    pub fn classify(&self, time_ms: u32, energy: f64) -> VadDecision {
        let past_initial_window = time_ms > self.initial_adjust_ms;
        if (past_initial_window && energy > self.threshold) || energy > self.max_threshold {
            VadDecision::Voice
        } else {
            VadDecision::Silence
        }
    }

    /// Candidate threshold for the given average energy.
    pub fn candidate(&self, average_energy: f64) -> f64 {
        (average_energy * self.adjust_multiplier)
            .min(self.threshold * self.adjust_limit)
            .min(self.max_threshold)
    }

    /// Raise the threshold toward the background level. Returns `true` if
    /// it changed.
    pub fn adjust(&mut self, time_ms: u32, average_energy: f64) -> bool {
        let candidate = self.candidate(average_energy);
        if candidate > self.threshold {
            debug!(
                time_ms,
                from = self.threshold,
                to = candidate,
                average_energy,
                "increasing energy threshold"
            );
            self.threshold = candidate;
            true
        } else {
            debug!(time_ms, threshold = self.threshold, average_energy, "threshold unchanged");
            false
        }
    }

    fn initial_adjust_due(&self, time_ms: u32) -> bool {
        self.initial_adjust_ms != 0 && !self.initial_adjusted && time_ms >= self.initial_adjust_ms
    }

    fn voice_adjust_due(&self, time_ms: u32, first_voice_ms: Option<u32>) -> bool {
        if self.voice_adjust_ms == 0 || self.voice_adjusted {
            return false;
        }
        first_voice_ms.is_some_and(|onset| time_ms >= onset.saturating_add(self.voice_adjust_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn frame(time_ms: u32, energy: f64, average_energy: f64) -> FeatureFrame {
        FeatureFrame {
            time_ms,
            energy,
            zero_crossings: 0,
            average_energy,
        }
    }

    fn config() -> VadConfig {
        VadConfig {
            energy_threshold: 100.0,
            max_energy_threshold: 1_000.0,
            initial_adjust_ms: 50,
            voice_adjust_ms: 30,
            adjust_limit: 3.0,
            adjust_multiplier: 0.5,
            ..VadConfig::default()
        }
    }

    #[test]
    fn only_ceiling_counts_inside_initial_window() {
        let t = AdaptiveThreshold::new(&config());
        assert_eq!(t.classify(50, 500.0), VadDecision::Silence);
        assert_eq!(t.classify(50, 1_001.0), VadDecision::Voice);
        assert_eq!(t.classify(60, 500.0), VadDecision::Voice);
        assert_eq!(t.classify(60, 100.0), VadDecision::Silence);
    }

    #[test]
    fn initial_adjust_is_bounded_by_limit() {
        let mut t = AdaptiveThreshold::new(&config());
        t.observe(&frame(40, 0.0, 800.0), None);
        assert_relative_eq!(t.value(), 100.0);
        t.observe(&frame(50, 0.0, 800.0), None);
        assert_relative_eq!(t.value(), 300.0);
        // Fires once only.
        t.observe(&frame(60, 0.0, 800.0), None);
        assert_relative_eq!(t.value(), 300.0);
    }

    #[test]
    fn voice_adjust_follows_first_voice() {
        let mut t = AdaptiveThreshold::new(&config());
        t.observe(&frame(50, 0.0, 300.0), None);
        assert_relative_eq!(t.value(), 150.0);
        t.observe(&frame(100, 0.0, 500.0), Some(80));
        assert_relative_eq!(t.value(), 150.0);
        t.observe(&frame(110, 0.0, 500.0), Some(80));
        assert_relative_eq!(t.value(), 250.0);
    }

    #[test]
    fn adjustment_never_lowers_threshold() {
        let mut t = AdaptiveThreshold::new(&config());
        assert!(!t.adjust(10, 20.0));
        assert_relative_eq!(t.value(), 100.0);
    }

    #[test]
    fn ceiling_caps_candidate() {
        let cfg = VadConfig {
            adjust_limit: 100.0,
            ..config()
        };
        let mut t = AdaptiveThreshold::new(&cfg);
        assert!(t.adjust(10, 5_000.0));
        assert_relative_eq!(t.value(), 1_000.0);
    }

    #[test]
    fn steady_signal_stays_above_adapted_threshold() {
        let mut t = AdaptiveThreshold::new(&VadConfig::default());
        let mut decisions = Vec::new();
        for time in (10..=400).step_by(10) {
            decisions.push(t.observe(&frame(time, 600.0, 600.0), Some(120)));
        }
        assert!(t.value() < 600.0);
        assert!(decisions[10..].iter().all(|d| d.is_voice()));
    }

    #[test]
    fn disabled_windows_never_adjust() {
        let cfg = VadConfig {
            initial_adjust_ms: 0,
            voice_adjust_ms: 0,
            ..config()
        };
        let mut t = AdaptiveThreshold::new(&cfg);
        for time in (10..=500).step_by(10) {
            t.observe(&frame(time, 0.0, 900.0), Some(10));
        }
        assert_relative_eq!(t.value(), 100.0);
        // No initial window: the plain threshold applies from the start.
        assert_eq!(t.classify(10, 150.0), VadDecision::Voice);
    }
}
