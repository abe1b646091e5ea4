//! # samd-core
//!
//! Answering machine detection for telephony audio.
//!
//! ## Architecture
//!
//! ```text
//! process_buffer(&[i16]) → FrameAnalyzer (10 ms frames: energy, zero crossings)
//!                                │
//!                    ┌───────────┴───────────┐
//!               BeepDetector            VoiceDetector
//!                    │                        │
//!                BeepEvent                VadEvent
//!                    └───────────┬───────────┘
//!                          AMD state machine
//!                                │
//!                            AmdEvent → handler
//! ```
//!
//! Everything runs synchronously on the caller's thread: every event caused
//! by a buffer is delivered before `process_buffer` returns. One detector
//! instance serves one call.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod beep;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod frame;
pub mod vad;

// Convenience re-exports for downstream crates
pub use beep::{Beep, BeepDetector};
pub use config::{AmdConfig, BeepConfig, VadConfig};
pub use engine::amd::{Amd, AmdClassifier, AmdState};
pub use engine::{FrameListener, Session};
pub use error::{AmdError, Result};
pub use events::{
    AmdEvent, AmdEventKind, BeepEvent, Disposition, EventHandler, VadEvent, VadEventKind,
};
pub use frame::{FeatureFrame, FrameAnalyzer};
pub use vad::{Vad, VoiceDetector};
