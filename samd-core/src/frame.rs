//! Frame analysis: interleaved PCM → 10 ms feature frames.
//!
//! ## Design
//!
//! Callers push buffers of arbitrary length. `FrameAnalyzer` accumulates
//! per-frame energy and zero crossings across calls, so the frames it yields
//! depend only on the sample stream, never on how the stream was chunked.
//! Incomplete interleaved sample sets (e.g. the left channel of a stereo pair
//! at the end of a buffer) are carried over to the next call as well.
//!
//! Energy is summed on every `downsample_factor`-th sample of a frame so
//! that the per-frame cost stays roughly that of 8 kHz audio.
//!
//! ## Usage
//!
//! ```
//! use samd_core::frame::FrameAnalyzer;
//!
//! let mut analyzer = FrameAnalyzer::new(8_000);
//! let samples = vec![0i16; 160];
//! let times: Vec<u32> = analyzer.frames(&samples, 1).map(|f| f.time_ms).collect();
//! assert_eq!(times, vec![10, 20]);
//! ```

use tracing::trace;

/// Duration of one feature frame.
pub const MS_PER_FRAME: u32 = 10;

/// Rate that `downsample_factor` normalises energy accumulation to.
pub const INTERNAL_SAMPLE_RATE: u32 = 8_000;

/// Frames per second (`sample_rate / FRAME_DIVISOR` samples per frame).
const FRAME_DIVISOR: u32 = 1_000 / MS_PER_FRAME;

/// Only the first two channels contribute energy and the mixed signal.
const MAX_ANALYZED_CHANNELS: usize = 2;

/// Features of one 10 ms frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureFrame {
    /// Stream time at the end of this frame (ms since stream start).
    pub time_ms: u32,
    /// Mean absolute amplitude, max across the first two channels.
    pub energy: f64,
    /// Negative → non-negative transitions of the mixed mono signal.
    pub zero_crossings: u32,
    /// Lifetime average frame energy, including this frame.
    pub average_energy: f64,
}

/// Accumulates PCM samples into feature frames.
#[derive(Debug, Clone)]
pub struct FrameAnalyzer {
    sample_rate: u32,
    samples_per_frame: u32,
    downsample_factor: u32,
    /// Sample sets accumulated in the current frame.
    samples: u32,
    /// Per-channel sum of absolute amplitude for the current frame.
    energy: [f64; MAX_ANALYZED_CHANNELS],
    zero_crossings: u32,
    last_sample: i16,
    time_ms: u32,
    total_energy: f64,
    /// Leading samples of an interleaved set split across buffers.
    carry: Vec<i16>,
}

impl FrameAnalyzer {
    /// Create an analyzer for `sample_rate` Hz input.
    ///
    /// Rates below 100 Hz would produce empty frames; they are clamped to
    /// one sample per frame. Range validation of user-facing rates happens
    /// in the config layer.
    pub fn new(sample_rate: u32) -> Self {
        let mut analyzer = Self {
            sample_rate,
            samples_per_frame: 1,
            downsample_factor: 1,
            samples: 0,
            energy: [0.0; MAX_ANALYZED_CHANNELS],
            zero_crossings: 0,
            last_sample: 0,
            time_ms: 0,
            total_energy: 0.0,
            carry: Vec::new(),
        };
        analyzer.set_sample_rate(sample_rate);
        analyzer
    }

    /// Change the input rate. Discards the frame in progress; the frame clock
    /// and lifetime energy are kept.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.samples_per_frame = (sample_rate / FRAME_DIVISOR).max(1);
        self.downsample_factor = (sample_rate / INTERNAL_SAMPLE_RATE).max(1);
        self.reset_frame();
        self.carry.clear();
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples_per_frame(&self) -> u32 {
        self.samples_per_frame
    }

    pub fn downsample_factor(&self) -> u32 {
        self.downsample_factor
    }

    /// Stream time of the last completed frame.
    pub fn time_ms(&self) -> u32 {
        self.time_ms
    }

    /// Number of frames completed so far.
    pub fn frame_count(&self) -> u32 {
        self.time_ms / MS_PER_FRAME
    }

    /// Lifetime total energy divided by elapsed frames (0 before the first frame).
    pub fn average_energy(&self) -> f64 {
        match self.frame_count() {
            0 => 0.0,
            frames => self.total_energy / f64::from(frames),
        }
    }

    /// Lazily yield the frames completed by `samples`.
    ///
    /// Samples are consumed as the iterator advances; dropping it early
    /// leaves the rest of the buffer unprocessed. `channels == 0` yields
    /// nothing.
    pub fn frames<'a>(&'a mut self, samples: &'a [i16], channels: u16) -> Frames<'a> {
        let channels = usize::from(channels);
        if channels != 0 && self.carry.len() >= channels {
            // Channel layout changed between calls; the partial set is meaningless.
            self.carry.clear();
        }
        Frames {
            analyzer: self,
            samples,
            channels,
            pos: 0,
        }
    }

    /// Feed a whole buffer, invoking `on_frame` for every completed frame.
    pub fn process_buffer(
        &mut self,
        samples: &[i16],
        channels: u16,
        mut on_frame: impl FnMut(&FeatureFrame),
    ) {
        for frame in self.frames(samples, channels) {
            on_frame(&frame);
        }
    }

    /// Account one interleaved sample set; returns a frame when it completes one.
    fn push(&mut self, set: [i16; MAX_ANALYZED_CHANNELS], channels: usize) -> Option<FeatureFrame> {
        let sample_in_frame = self.samples;
        self.samples += 1;

        let analyzed = channels.min(MAX_ANALYZED_CHANNELS);
        let mut mixed: i32 = 0;
        for (c, &sample) in set.iter().enumerate().take(analyzed) {
            mixed += i32::from(sample);
            if sample_in_frame % self.downsample_factor == 0 {
                self.energy[c] += f64::from(sample.unsigned_abs());
            }
        }
        let mixed = mixed.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;

        if self.last_sample < 0 && mixed >= 0 {
            self.zero_crossings += 1;
        }
        self.last_sample = mixed;

        if self.samples < self.samples_per_frame {
            return None;
        }

        self.time_ms += MS_PER_FRAME;

        let divisor = f64::from((self.samples / self.downsample_factor).max(1));
        let energy = self
            .energy
            .iter()
            .map(|e| e / divisor)
            .fold(0.0_f64, f64::max);
        self.total_energy += energy;

        let frame = FeatureFrame {
            time_ms: self.time_ms,
            energy,
            zero_crossings: self.zero_crossings,
            average_energy: self.average_energy(),
        };
        trace!(
            time_ms = frame.time_ms,
            energy = frame.energy,
            zero_crossings = frame.zero_crossings,
            "frame"
        );

        self.reset_frame();
        Some(frame)
    }

    fn reset_frame(&mut self) {
        self.samples = 0;
        self.energy = [0.0; MAX_ANALYZED_CHANNELS];
        self.zero_crossings = 0;
    }
}

/// Iterator over the frames completed by one buffer. See [`FrameAnalyzer::frames`].
pub struct Frames<'a> {
    analyzer: &'a mut FrameAnalyzer,
    samples: &'a [i16],
    channels: usize,
    pos: usize,
}

impl Frames<'_> {
    /// Next complete interleaved sample set, padded to two channels with zeros.
    fn next_set(&mut self) -> Option<[i16; MAX_ANALYZED_CHANNELS]> {
        let samples = self.samples;
        let carry = &mut self.analyzer.carry;

        let needed = self.channels - carry.len();
        let remaining = &samples[self.pos..];
        if remaining.len() < needed {
            carry.extend_from_slice(remaining);
            self.pos = samples.len();
            return None;
        }

        let mut set = [0i16; MAX_ANALYZED_CHANNELS];
        let taken = &remaining[..needed];
        for (c, &sample) in carry.iter().chain(taken).take(MAX_ANALYZED_CHANNELS).enumerate() {
            set[c] = sample;
        }
        carry.clear();
        self.pos += needed;
        Some(set)
    }
}

impl Iterator for Frames<'_> {
    type Item = FeatureFrame;

    fn next(&mut self) -> Option<FeatureFrame> {
        if self.channels == 0 {
            return None;
        }
        while let Some(set) = self.next_set() {
            if let Some(frame) = self.analyzer.push(set, self.channels) {
                return Some(frame);
            }
        }
        None
    }
}
