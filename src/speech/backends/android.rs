//! Mobile platform backend reached through a foreign-function bridge
//!
//! The platform synthesizer lives on the other side of the bridge (JNI on
//! Android). [`SpeechBridge`] is the object the glue code exposes; the
//! glue forwards the platform's progress listener calls into
//! [`AndroidEngine::notify`] on the engine's thread.
//!
//! The platform has no pause primitive. A pending pause commits at the
//! next range notification by stopping the platform and remembering where
//! that range starts; resume submits the remainder of the text.

use crate::speech::catalog::VoiceCatalog;
use crate::speech::engine::{in_range, BoundaryHint, Engine};
use crate::speech::report::ErrorReason;
use crate::speech::state::{EngineEvent, PlaybackState, PlaybackStateMachine};
use crate::speech::voice::{Age, Gender, Locale, Voice};
use crate::Result;
use log::{debug, error, warn};
use std::time::Instant;

/// Platform error codes reported through `onError`
const ERROR_SERVICE: i32 = -4;
const ERROR_NOT_INSTALLED_YET: i32 = -9;

/// A voice as the platform lists it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeVoice {
    /// Platform voice name, unique per device
    pub id: String,
    pub name: String,
    /// BCP-47 tag
    pub locale: String,
    pub gender: Gender,
}

/// Progress callbacks from the platform, tagged with the utterance id
/// passed to [`SpeechBridge::say`]
///
/// Range offsets are byte offsets into the submitted text; the glue
/// converts from the platform's UTF-16 offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeNotification {
    Initialized(bool),
    Start { utterance: u64 },
    RangeStart { utterance: u64, start: usize, end: usize },
    Done { utterance: u64 },
    Error { utterance: u64, code: i32 },
}

/// Platform synthesizer object on the far side of the bridge
///
/// Rate and pitch are platform multipliers (1.0 is normal).
pub trait SpeechBridge {
    fn say(&mut self, text: &str, utterance: u64) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    fn set_rate(&mut self, multiplier: f64) -> Result<()>;

    fn set_pitch(&mut self, multiplier: f64) -> Result<()>;

    fn set_volume(&mut self, volume: f64) -> Result<()>;

    /// BCP-47 tags of the languages installed on the device
    fn locales(&self) -> Vec<String>;

    fn voices(&self) -> Vec<BridgeVoice>;

    fn set_voice(&mut self, id: &str) -> Result<()>;

    /// Release the platform object
    fn shutdown(&mut self);
}

pub struct AndroidEngine<B: SpeechBridge> {
    bridge: B,
    initialized: bool,
    catalog: VoiceCatalog,
    machine: PlaybackStateMachine,
    /// Utterance id currently submitted to the platform
    utterance: Option<u64>,
    next_utterance: u64,
    /// Offset of the submitted text within the session text
    base_offset: usize,
    /// Where resume picks up: start of the range the pause cut off
    resume_offset: usize,
    voice: Option<Voice>,
    rate: f64,
    pitch: f64,
    volume: f64,
}

/// Map a value in [-1, 1] to a multiplier in [0.5, 2.0]
fn multiplier(value: f64) -> f64 {
    2f64.powf(value)
}

fn reason_for_code(code: i32) -> ErrorReason {
    match code {
        ERROR_SERVICE => ErrorReason::Initialization,
        ERROR_NOT_INSTALLED_YET => ErrorReason::Configuration,
        _ => ErrorReason::Input,
    }
}

impl<B: SpeechBridge> AndroidEngine<B> {
    /// Wrap an opened bridge; the engine is usable once the platform
    /// reports `Initialized(true)`
    pub fn new(bridge: B) -> Self {
        Self {
            bridge,
            initialized: false,
            catalog: VoiceCatalog::new(),
            machine: PlaybackStateMachine::new(),
            utterance: None,
            next_utterance: 0,
            base_offset: 0,
            resume_offset: 0,
            voice: None,
            rate: 0.0,
            pitch: 0.0,
            volume: 1.0,
        }
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut B {
        &mut self.bridge
    }

    /// Handle one platform callback
    pub fn notify(&mut self, notification: BridgeNotification) {
        debug!("Bridge notification: {:?}", notification);
        match notification {
            BridgeNotification::Initialized(success) => self.on_initialized(success),
            BridgeNotification::Start { utterance } => {
                if self.utterance != Some(utterance) {
                    return;
                }
            }
            BridgeNotification::RangeStart {
                utterance,
                start,
                end,
            } => {
                if self.utterance != Some(utterance) {
                    return;
                }
                if self.machine.pause_pending() {
                    // The word starting here has not been heard yet
                    if let Err(e) = self.bridge.stop() {
                        warn!("Failed to stop for pause: {}", e);
                    }
                    self.utterance = None;
                    self.resume_offset = self.base_offset + start;
                    self.machine.enter_paused();
                } else {
                    let length = end.saturating_sub(start);
                    self.machine.word_reported(self.base_offset + start, length);
                }
            }
            BridgeNotification::Done { utterance } => {
                if self.utterance != Some(utterance) {
                    return;
                }
                self.utterance = None;
                self.machine.finish();
            }
            BridgeNotification::Error { utterance, code } => {
                if self.utterance != Some(utterance) {
                    return;
                }
                self.utterance = None;
                self.machine
                    .fail(reason_for_code(code), "Speech synthesizing failure.");
            }
        }
    }

    fn on_initialized(&mut self, success: bool) {
        if !success {
            self.initialized = false;
            self.machine.fail(
                ErrorReason::Initialization,
                "Could not initialize text-to-speech engine.",
            );
            return;
        }

        let installed: Vec<Locale> = self
            .bridge
            .locales()
            .iter()
            .filter_map(|tag| Locale::parse(tag).ok())
            .collect();
        let voices = self.bridge.voices().into_iter().filter_map(|v| {
            let locale = match Locale::parse(&v.locale) {
                Ok(locale) => locale,
                Err(e) => {
                    warn!("Skipping voice {}: {}", v.id, e);
                    return None;
                }
            };
            // An empty language list means the platform could not tell us
            if !installed.is_empty() && !installed.contains(&locale) {
                debug!("Skipping voice {}: {} not installed", v.id, locale);
                return None;
            }
            Some(Voice::new(&v.name, locale, v.gender, Age::Adult, &v.id))
        });
        self.catalog.rebuild(voices);

        if self.catalog.is_empty() {
            self.machine
                .fail(ErrorReason::Configuration, "No voices available.");
            return;
        }

        self.initialized = true;
        let keeps_voice = self
            .voice
            .as_ref()
            .map(|v| self.catalog.contains(v))
            .unwrap_or(false);
        if !keeps_voice {
            self.voice = self
                .catalog
                .locales()
                .first()
                .and_then(|l| self.catalog.first_voice(l))
                .cloned();
        }
        self.machine.recover();
    }

    /// Session text from `offset` on; `None` past the end or inside a
    /// character
    fn remaining_text(&self, offset: usize) -> Option<String> {
        self.machine
            .session()
            .and_then(|s| s.text().get(offset..))
            .map(str::to_string)
    }

    /// Send the session text from `offset` on to the platform
    fn submit(&mut self, offset: usize) {
        let Some(remaining) = self.remaining_text(offset) else {
            error!("Cannot submit text from offset {}", offset);
            self.utterance = None;
            self.machine
                .fail(ErrorReason::Input, "Speech synthesizing failure.");
            return;
        };

        self.next_utterance += 1;
        let id = self.next_utterance;
        match self.bridge.say(&remaining, id) {
            Ok(()) => {
                self.utterance = Some(id);
                self.base_offset = offset;
            }
            Err(e) => {
                error!("Failed to speak: {}", e);
                self.utterance = None;
                self.machine
                    .fail(ErrorReason::Input, "Speech synthesizing failure.");
            }
        }
    }
}

impl<B: SpeechBridge> Drop for AndroidEngine<B> {
    fn drop(&mut self) {
        self.bridge.shutdown();
    }
}

impl<B: SpeechBridge> Engine for AndroidEngine<B> {
    fn name(&self) -> &'static str {
        "android"
    }

    fn available_locales(&self) -> Vec<Locale> {
        self.catalog.locales()
    }

    fn available_voices(&self) -> Vec<Voice> {
        match self.locale() {
            Some(locale) => self.catalog.voices_for(&locale),
            None => Vec::new(),
        }
    }

    fn speak(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.initialized {
            warn!("Cannot speak: platform synthesizer not initialized");
            return;
        }
        if matches!(
            self.machine.state(),
            PlaybackState::Speaking | PlaybackState::Paused
        ) {
            self.stop(BoundaryHint::Default);
        }

        debug!("Speaking: {}", text);
        self.machine.begin(text);
        self.submit(0);
    }

    fn stop(&mut self, hint: BoundaryHint) {
        if !self.initialized {
            return;
        }
        debug!("Stopping speech ({:?})", hint);
        if self.utterance.take().is_some() {
            if let Err(e) = self.bridge.stop() {
                warn!("Failed to stop: {}", e);
            }
        }
        self.machine.stop();
    }

    fn pause(&mut self, hint: BoundaryHint) {
        if self.machine.request_pause() {
            debug!("Pause requested ({:?}), applies at next word", hint);
        }
    }

    fn resume(&mut self) {
        if self.machine.state() != PlaybackState::Paused {
            return;
        }
        if self.remaining_text(self.resume_offset).is_none() {
            warn!("Resume offset {} is not in the text", self.resume_offset);
            self.machine
                .fail(ErrorReason::Input, "Speech synthesizing failure.");
            return;
        }
        self.machine.resume();
        self.submit(self.resume_offset);
    }

    fn rate(&self) -> f64 {
        self.rate
    }

    fn set_rate(&mut self, rate: f64) -> bool {
        if !in_range(rate, -1.0, 1.0) {
            return false;
        }
        match self.bridge.set_rate(multiplier(rate)) {
            Ok(()) => {
                self.rate = rate;
                true
            }
            Err(e) => {
                warn!("Failed to set rate: {}", e);
                false
            }
        }
    }

    fn pitch(&self) -> f64 {
        self.pitch
    }

    fn set_pitch(&mut self, pitch: f64) -> bool {
        if !in_range(pitch, -1.0, 1.0) {
            return false;
        }
        match self.bridge.set_pitch(multiplier(pitch)) {
            Ok(()) => {
                self.pitch = pitch;
                true
            }
            Err(e) => {
                warn!("Failed to set pitch: {}", e);
                false
            }
        }
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn set_volume(&mut self, volume: f64) -> bool {
        if !in_range(volume, 0.0, 1.0) {
            return false;
        }
        match self.bridge.set_volume(volume) {
            Ok(()) => {
                self.volume = volume;
                true
            }
            Err(e) => {
                warn!("Failed to set volume: {}", e);
                false
            }
        }
    }

    fn locale(&self) -> Option<Locale> {
        self.voice.as_ref().map(|v| v.locale().clone())
    }

    fn set_locale(&mut self, locale: &Locale) -> bool {
        let Some(first) = self.catalog.first_voice(locale).cloned() else {
            self.machine.reject(
                ErrorReason::Configuration,
                &format!("No voice found for locale {}.", locale),
            );
            return false;
        };
        if self.locale().as_ref() == Some(locale) {
            self.machine.recover();
            return true;
        }
        self.set_voice(&first)
    }

    fn voice(&self) -> Option<Voice> {
        self.voice.clone()
    }

    fn set_voice(&mut self, voice: &Voice) -> bool {
        if let Err(e) = self.catalog.select(voice, voice.locale()) {
            warn!("{}", e);
            self.machine.reject(ErrorReason::Configuration, &e.to_string());
            return false;
        }
        if let Err(e) = self.bridge.set_voice(voice.token()) {
            warn!("Failed to set voice {}: {}", voice.token(), e);
            self.machine
                .reject(ErrorReason::Configuration, "Could not set voice.");
            return false;
        }
        self.voice = Some(voice.clone());
        self.machine.recover();
        true
    }

    fn state(&self) -> PlaybackState {
        self.machine.state()
    }

    fn error_reason(&self) -> ErrorReason {
        self.machine.error_reason()
    }

    fn error_string(&self) -> String {
        self.machine.error_string().to_string()
    }

    fn next_deadline(&self) -> Option<Instant> {
        // Progress arrives through notify()
        None
    }

    fn process(&mut self, _now: Instant) {}

    fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.machine.drain_events()
    }
}
