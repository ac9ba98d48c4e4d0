//! speechmux - uniform text-to-speech playback
//!
//! Drives several incompatible speech synthesizers (a deterministic mock,
//! a native system synthesizer, and a mobile platform bridge) through one
//! engine interface with identical playback states and word-boundary events.

pub mod config;
pub mod error;
pub mod platform;
pub mod speech;

pub use error::{Result, SpeechError};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "speechmux";
