//! Engine abstraction
//!
//! Every backend implements [`Engine`] with the same observable playback
//! semantics. Clients issue commands and read state without knowing which
//! synthesizer is underneath.

use super::backends::mock::{MockEngine, MockOptions};
use super::backends::native::NativeEngine;
use super::report::ErrorReason;
use super::state::{EngineEvent, PlaybackState};
use super::voice::{Locale, Voice};
use crate::config::Config;
use log::{info, warn};
use std::time::{Duration, Instant};

/// Where a stop or pause should take effect
///
/// Advisory only: backends without fine control treat every hint the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryHint {
    #[default]
    Default,
    Immediate,
    Word,
    Sentence,
    Utterance,
}

impl BoundaryHint {
    /// Parse a hint name as typed at the harness prompt
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Some(BoundaryHint::Default),
            "now" | "immediate" => Some(BoundaryHint::Immediate),
            "word" => Some(BoundaryHint::Word),
            "sentence" => Some(BoundaryHint::Sentence),
            "utterance" => Some(BoundaryHint::Utterance),
            _ => None,
        }
    }
}

/// Which backend the factory should build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Native synthesizer when available, otherwise the mock
    Auto,
    Mock,
    Native,
}

impl BackendKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(BackendKind::Auto),
            "mock" => Some(BackendKind::Mock),
            "native" => Some(BackendKind::Native),
            _ => None,
        }
    }
}

/// Uniform text-to-speech engine
///
/// Commands return immediately; progress arrives through
/// [`process`](Engine::process) and is reported as [`EngineEvent`]s.
/// Expected failures come back as `false` with the reason available from
/// [`error_reason`](Engine::error_reason).
pub trait Engine {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    fn available_locales(&self) -> Vec<Locale>;

    /// Voices for the current locale
    fn available_voices(&self) -> Vec<Voice>;

    /// Start speaking, replacing any utterance in progress
    fn speak(&mut self, text: &str);

    fn stop(&mut self, hint: BoundaryHint);

    /// Request a pause at the next word boundary
    fn pause(&mut self, hint: BoundaryHint);

    fn resume(&mut self);

    /// Speech rate in [-1.0, 1.0], 0.0 is normal
    fn rate(&self) -> f64;
    fn set_rate(&mut self, rate: f64) -> bool;

    /// Pitch in [-1.0, 1.0], 0.0 is normal
    fn pitch(&self) -> f64;
    fn set_pitch(&mut self, pitch: f64) -> bool;

    /// Volume in [0.0, 1.0]
    fn volume(&self) -> f64;
    fn set_volume(&mut self, volume: f64) -> bool;

    fn locale(&self) -> Option<Locale>;
    fn set_locale(&mut self, locale: &Locale) -> bool;

    fn voice(&self) -> Option<Voice>;
    fn set_voice(&mut self, voice: &Voice) -> bool;

    fn state(&self) -> PlaybackState;
    fn error_reason(&self) -> ErrorReason;
    fn error_string(&self) -> String;

    /// Next instant at which [`process`](Engine::process) has timer work
    fn next_deadline(&self) -> Option<Instant>;

    /// Fire due timers and handle pending backend notifications
    fn process(&mut self, now: Instant);

    /// Take queued events in emission order
    fn drain_events(&mut self) -> Vec<EngineEvent>;
}

/// Longest per-word interval a word timer will schedule
pub const MAX_WORD_INTERVAL_MS: u64 = 60_000;

/// Per-word interval for a timer-driven tracker
///
/// Rate in [-1, 1] scales the base interval by `1 - rate / 2`, so higher
/// rates give shorter words.
pub(crate) fn word_interval(base_ms: u64, rate: f64) -> Duration {
    let factor = 1.0 - rate / 2.0;
    let nanos = (base_ms.min(MAX_WORD_INTERVAL_MS) as f64 * 1_000_000.0 * factor).round();
    Duration::from_nanos(nanos as u64)
}

/// True for a finite value inside `[min, max]`
pub(crate) fn in_range(value: f64, min: f64, max: f64) -> bool {
    value.is_finite() && value >= min && value <= max
}

/// Create an engine for the configured backend
///
/// Initialization failures do not abort: the engine comes back in the
/// Error state so the caller can inspect [`Engine::error_string`].
pub fn create_engine(config: &Config) -> Box<dyn Engine> {
    let options = MockOptions {
        word_interval_ms: config.mock_word_interval_ms(),
        fail_init: config.mock_fail_init(),
    };

    match config.backend() {
        BackendKind::Mock => {
            info!("Creating mock speech engine");
            Box::new(MockEngine::with_options(options))
        }
        BackendKind::Native => {
            info!("Creating native speech engine");
            Box::new(NativeEngine::system())
        }
        BackendKind::Auto => {
            info!("Trying native speech engine...");
            let native = NativeEngine::system();
            if native.state() != PlaybackState::Error {
                info!("✓ Native speech engine ready");
                return Box::new(native);
            }
            info!("✗ Native speech engine unavailable: {}", native.error_string());
            info!("Falling back to mock speech engine");
            Box::new(MockEngine::with_options(options))
        }
    }
}

/// Push configured speech settings into an engine
///
/// A rejected value is logged and skipped; the rest still apply.
pub fn apply_settings(engine: &mut dyn Engine, config: &Config) {
    if let Some(locale) = config.locale() {
        if engine.set_locale(&locale) {
            info!("Speech locale set to {}", locale);
        } else {
            warn!("Configured locale {} not available", locale);
        }
    }
    if let Some(name) = config.voice_name() {
        let voice = engine
            .available_voices()
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(&name));
        match voice {
            Some(voice) if engine.set_voice(&voice) => info!("Speech voice set to {}", name),
            _ => warn!("Configured voice {} not available", name),
        }
    }
    if let Some(rate) = config.rate() {
        if !engine.set_rate(rate) {
            warn!("Configured rate {} rejected", rate);
        }
    }
    if let Some(pitch) = config.pitch() {
        if !engine.set_pitch(pitch) {
            warn!("Configured pitch {} rejected", pitch);
        }
    }
    if let Some(volume) = config.volume() {
        if !engine.set_volume(volume) {
            warn!("Configured volume {} rejected", volume);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_kind() {
        assert_eq!(BackendKind::parse("Mock"), Some(BackendKind::Mock));
        assert_eq!(BackendKind::parse(" native "), Some(BackendKind::Native));
        assert_eq!(BackendKind::parse("auto"), Some(BackendKind::Auto));
        assert_eq!(BackendKind::parse("sapi"), None);
    }

    #[test]
    fn test_parse_boundary_hint() {
        assert_eq!(BoundaryHint::parse(""), Some(BoundaryHint::Default));
        assert_eq!(BoundaryHint::parse("now"), Some(BoundaryHint::Immediate));
        assert_eq!(BoundaryHint::parse("Sentence"), Some(BoundaryHint::Sentence));
        assert_eq!(BoundaryHint::parse("utterance"), Some(BoundaryHint::Utterance));
        assert_eq!(BoundaryHint::parse("paragraph"), None);
    }

    #[test]
    fn test_word_interval_scaling() {
        assert_eq!(word_interval(100, 0.0), Duration::from_millis(100));
        assert_eq!(word_interval(100, 1.0), Duration::from_millis(50));
        assert_eq!(word_interval(100, -1.0), Duration::from_millis(150));
        assert_eq!(
            word_interval(u64::MAX, 0.0),
            Duration::from_millis(MAX_WORD_INTERVAL_MS)
        );
    }

    #[test]
    fn test_in_range() {
        assert!(in_range(0.5, 0.0, 1.0));
        assert!(in_range(1.0, 0.0, 1.0));
        assert!(!in_range(1.01, 0.0, 1.0));
        assert!(!in_range(f64::NAN, 0.0, 1.0));
    }
}
