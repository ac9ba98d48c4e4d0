//! Native synthesizer backend
//!
//! Drives a system speech handle that reports progress through its own
//! asynchronous notifications (stream start/end and word boundaries), the
//! way desktop speech APIs do. The handle itself sits behind
//! [`SpeechDriver`]; [`NativeEngine`] turns its notifications into the
//! common playback states.
//!
//! Desktop synthesizers have no pause/resume notifications, so a pause is
//! inferred: once a pause is pending, the next batch of notifications (or
//! the handle reporting it went quiet) commits the Paused state.
//!
//! Handles without word boundary notifications get estimated boundaries
//! from the tracker on a rate-scaled timer. Handles without a pause
//! primitive are purged at the next boundary and resubmitted from that
//! word on resume.

use super::system::SystemDriver;
use crate::platform;
use crate::speech::boundary::WordBoundaryTracker;
use crate::speech::catalog::VoiceCatalog;
use crate::speech::engine::{in_range, word_interval, BoundaryHint, Engine};
use crate::speech::report::ErrorReason;
use crate::speech::state::{EngineEvent, PlaybackState, PlaybackStateMachine};
use crate::speech::voice::{Age, Gender, Locale, Voice};
use crate::Result;
use log::{debug, error, warn};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// How often an active engine wants `process` called to poll the handle
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Estimated time per word at rate 0 when the handle reports no boundaries
const ESTIMATED_WORD_MS: u64 = 300;

/// Windows locale identifiers for the languages voices commonly ship with
const LCID_TABLE: &[(u32, &str)] = &[
    (0x0404, "zh-TW"),
    (0x0405, "cs-CZ"),
    (0x0406, "da-DK"),
    (0x0407, "de-DE"),
    (0x0408, "el-GR"),
    (0x0409, "en-US"),
    (0x040B, "fi-FI"),
    (0x040C, "fr-FR"),
    (0x040D, "he-IL"),
    (0x040E, "hu-HU"),
    (0x0410, "it-IT"),
    (0x0411, "ja-JP"),
    (0x0412, "ko-KR"),
    (0x0413, "nl-NL"),
    (0x0414, "nb-NO"),
    (0x0415, "pl-PL"),
    (0x0416, "pt-BR"),
    (0x0419, "ru-RU"),
    (0x041D, "sv-SE"),
    (0x041F, "tr-TR"),
    (0x0804, "zh-CN"),
    (0x0809, "en-GB"),
    (0x080A, "es-MX"),
    (0x0816, "pt-PT"),
    (0x0C09, "en-AU"),
    (0x0C0A, "es-ES"),
    (0x0C0C, "fr-CA"),
    (0x1009, "en-CA"),
    (0x4009, "en-IN"),
];

/// What a native handle can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriverFeatures {
    /// Handle has pause/resume primitives
    pub pause: bool,
    /// Handle reports stream start/end notifications
    pub utterance_events: bool,
    /// Handle reports word boundary notifications
    pub word_boundaries: bool,
    /// Pitch is controlled by inline markup prepended to the text
    pub inline_pitch_markup: bool,
}

/// Notification from the native handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverEvent {
    /// Stream number returned by [`SpeechDriver::speak`]
    pub stream: u64,
    pub kind: DriverEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverEventKind {
    StreamStart,
    StreamEnd,
    /// Byte offset and length within the text handed to the driver
    WordBoundary { offset: usize, length: usize },
}

/// A registered voice as the handle describes it
///
/// Attributes follow the desktop voice registry: `Name`, `Gender`, `Age`,
/// and either `Language` (hex LCIDs separated by `;`) or `Locale`
/// (a BCP-47 tag).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceToken {
    pub id: String,
    pub attributes: BTreeMap<String, String>,
}

impl VoiceToken {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    fn attribute(&self, key: &str) -> &str {
        self.attributes.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn locale(&self) -> Option<Locale> {
        if let Some(tag) = self.attributes.get("Locale") {
            return Locale::parse(tag).ok();
        }
        lcid_to_locale(self.attribute("Language"))
    }

    /// Map onto the engine-independent voice model
    ///
    /// Returns `None` when no locale can be derived, so every cataloged
    /// voice belongs to a known locale.
    pub fn to_voice(&self) -> Option<Voice> {
        let locale = self.locale()?;
        let gender = match self.attribute("Gender") {
            "Male" => Gender::Male,
            "Female" => Gender::Female,
            _ => Gender::Unknown,
        };
        let age = match self.attribute("Age") {
            "Adult" => Age::Adult,
            _ => Age::Other,
        };
        Some(Voice::new(self.attribute("Name"), locale, gender, age, &self.id))
    }
}

/// Convert a `Language` attribute (`409` or `409;9`) to a locale
pub fn lcid_to_locale(language: &str) -> Option<Locale> {
    let first = language.split(';').next()?.trim();
    let lcid = u32::from_str_radix(first, 16).ok()?;
    LCID_TABLE
        .iter()
        .find(|(id, _)| *id == lcid)
        .and_then(|(_, tag)| Locale::parse(tag).ok())
}

/// A native speech handle
///
/// Rate and pitch are in [-1.0, 1.0] and volume in [0.0, 1.0]; the driver
/// maps them onto its own ranges. The handle is released when the driver
/// is dropped.
pub trait SpeechDriver {
    fn features(&self) -> DriverFeatures;

    fn voice_tokens(&self) -> Result<Vec<VoiceToken>>;

    /// Id of the voice token the handle currently uses
    fn current_voice_token(&self) -> Option<String>;

    fn set_voice_token(&mut self, id: &str) -> Result<()>;

    /// Queue text asynchronously and return its stream number
    fn speak(&mut self, text: &str) -> Result<u64>;

    /// Drop everything queued or playing
    fn purge(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn resume(&mut self) -> Result<()>;

    /// Whether audio is being produced right now
    fn is_speaking(&self) -> bool;

    fn set_rate(&mut self, rate: f64) -> Result<()>;

    fn set_pitch(&mut self, pitch: f64) -> Result<()>;

    fn set_volume(&mut self, volume: f64) -> Result<()>;

    /// Next pending notification, if any
    fn poll_event(&mut self) -> Option<DriverEvent>;
}

pub struct NativeEngine<D: SpeechDriver> {
    driver: Option<D>,
    features: DriverFeatures,
    catalog: VoiceCatalog,
    machine: PlaybackStateMachine,
    /// Stream number of the utterance in progress
    stream: Option<u64>,
    /// Length of markup injected in front of the client's text
    text_offset: usize,
    /// Whether `pause()` was forwarded and not yet matched by `resume()`
    native_paused: bool,
    tracker: WordBoundaryTracker,
    /// Next estimated word boundary
    word_deadline: Option<Instant>,
    /// Session offset of the text submitted to the handle
    base_offset: usize,
    /// Where speech picks up after a pause that purged the handle
    resume_offset: Option<usize>,
    rate: f64,
    pitch: f64,
    volume: f64,
}

impl NativeEngine<SystemDriver> {
    /// Engine on the platform's system synthesizer
    ///
    /// The process-wide native runtime must be active; see
    /// [`platform::NativeRuntime`].
    pub fn system() -> Self {
        if !platform::runtime_active() {
            return Self::unavailable("Native speech runtime is not initialized.");
        }
        Self::from_result(SystemDriver::new())
    }
}

impl<D: SpeechDriver> NativeEngine<D> {
    pub fn new(driver: D) -> Self {
        let features = driver.features();
        let mut engine = Self {
            driver: Some(driver),
            features,
            catalog: VoiceCatalog::new(),
            machine: PlaybackStateMachine::new(),
            stream: None,
            text_offset: 0,
            native_paused: false,
            tracker: WordBoundaryTracker::new(),
            word_deadline: None,
            base_offset: 0,
            resume_offset: None,
            rate: 0.0,
            pitch: 0.0,
            volume: 1.0,
        };

        engine.update_voices();
        if engine.catalog.is_empty() {
            engine
                .machine
                .fail(ErrorReason::Configuration, "No voices available.");
        }
        engine
    }

    /// Build from a driver constructor; a failed constructor leaves the
    /// engine in Error with reason Initialization
    pub fn from_result(driver: Result<D>) -> Self {
        match driver {
            Ok(driver) => Self::new(driver),
            Err(e) => {
                error!("Failed to create native speech handle: {}", e);
                Self::unavailable("Could not initialize text-to-speech engine.")
            }
        }
    }

    fn unavailable(message: &str) -> Self {
        let mut machine = PlaybackStateMachine::new();
        machine.fail(ErrorReason::Initialization, message);
        Self {
            driver: None,
            features: DriverFeatures::default(),
            catalog: VoiceCatalog::new(),
            machine,
            stream: None,
            text_offset: 0,
            native_paused: false,
            tracker: WordBoundaryTracker::new(),
            word_deadline: None,
            base_offset: 0,
            resume_offset: None,
            rate: 0.0,
            pitch: 0.0,
            volume: 1.0,
        }
    }

    pub fn driver(&self) -> Option<&D> {
        self.driver.as_ref()
    }

    pub fn driver_mut(&mut self) -> Option<&mut D> {
        self.driver.as_mut()
    }

    /// Rebuild the catalog from the handle's registered voices
    pub fn update_voices(&mut self) {
        let Some(driver) = self.driver.as_ref() else {
            return;
        };
        let tokens = match driver.voice_tokens() {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("Failed to enumerate voices: {}", e);
                Vec::new()
            }
        };

        let voices = tokens.iter().filter_map(|token| {
            let voice = token.to_voice();
            if voice.is_none() {
                warn!("Skipping voice {} with unknown language", token.id);
            }
            voice
        });
        self.catalog.rebuild(voices);
        debug!("Native catalog has {} voices", self.catalog.len());
    }

    fn markup_prefix(&self) -> String {
        if !self.features.inline_pitch_markup {
            return String::new();
        }
        format!("<pitch absmiddle=\"{}\"/>", (self.pitch * 10.0).round() as i64)
    }

    fn tracks_words(&self) -> bool {
        !self.features.word_boundaries
    }

    fn word_interval(&self) -> Duration {
        word_interval(ESTIMATED_WORD_MS, self.rate)
    }

    /// Session text from `offset` on, `None` past the end or inside a character
    fn remaining_text(&self, offset: usize) -> Option<String> {
        let text = self.machine.session()?.text();
        text.get(offset..).map(str::to_string)
    }

    /// Hand the session text from `offset` on to the driver
    fn submit(&mut self, offset: usize) {
        let Some(remaining) = self.remaining_text(offset) else {
            error!("Cannot speak from offset {}", offset);
            self.stream = None;
            self.word_deadline = None;
            self.machine
                .fail(ErrorReason::Input, "Speech synthesizing failure.");
            return;
        };
        let prefix = self.markup_prefix();
        let interval = self.word_interval();
        let Some(driver) = self.driver.as_mut() else {
            return;
        };

        match driver.speak(&format!("{}{}", prefix, remaining)) {
            Ok(stream) => {
                self.stream = Some(stream);
                self.text_offset = prefix.len();
                self.base_offset = offset;
                if self.tracks_words() {
                    self.word_deadline = Some(Instant::now() + interval);
                }
            }
            Err(e) => {
                error!("Failed to speak: {}", e);
                self.stream = None;
                self.word_deadline = None;
                self.machine
                    .fail(ErrorReason::Input, "Speech synthesizing failure.");
            }
        }
    }

    /// Stop the handle so speech picks up again at `offset`
    fn pause_by_purge(&mut self, offset: usize) {
        debug!("Pausing by purge at offset {}", offset);
        if let Some(driver) = self.driver.as_mut() {
            if let Err(e) = driver.purge() {
                warn!("Failed to purge speech: {}", e);
            }
        }
        self.stream = None;
        self.word_deadline = None;
        self.resume_offset = Some(offset);
        self.machine.enter_paused();
    }

    /// An estimated word boundary came due
    fn on_word_timer(&mut self) {
        let next = self
            .machine
            .session()
            .and_then(|session| self.tracker.next_word(session.text(), session.cursor()));
        let Some(span) = next else {
            // Only separators left; the handle reports completion
            self.word_deadline = None;
            return;
        };

        if self.machine.pause_pending() {
            if self.native_paused {
                self.word_deadline = None;
                self.machine.enter_paused();
            } else {
                self.pause_by_purge(span.start);
            }
            return;
        }
        self.machine.word_reported(span.start, span.length);
    }

    /// Report the words the timer has not reached yet
    fn flush_tracked_words(&mut self) {
        if !self.tracks_words() {
            return;
        }
        self.word_deadline = None;
        loop {
            let next = self
                .machine
                .session()
                .and_then(|session| self.tracker.next_word(session.text(), session.cursor()));
            let Some(span) = next else {
                break;
            };
            if span.length == 0 || !self.machine.word_reported(span.start, span.length) {
                break;
            }
        }
    }

    fn handle_event(&mut self, event: DriverEvent) {
        match event.kind {
            DriverEventKind::StreamStart => {
                debug!("Stream {} started", event.stream);
            }
            DriverEventKind::StreamEnd => {
                debug!("Stream {} ended", event.stream);
                if self.native_paused {
                    // The handle still counts the forwarded pause
                    if let Some(driver) = self.driver.as_mut() {
                        if let Err(e) = driver.resume() {
                            warn!("Failed to resume after stream end: {}", e);
                        }
                    }
                    self.native_paused = false;
                }
                self.flush_tracked_words();
                self.stream = None;
                self.machine.finish();
            }
            DriverEventKind::WordBoundary { offset, length } => {
                let start = self.base_offset + offset.saturating_sub(self.text_offset);
                if self.machine.pause_pending() && !self.native_paused {
                    self.pause_by_purge(start);
                } else {
                    self.machine.word_reported(start, length);
                }
            }
        }
    }
}

impl<D: SpeechDriver> Engine for NativeEngine<D> {
    fn name(&self) -> &'static str {
        "native"
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
        if self.driver.is_none() {
            warn!("Cannot speak: no native speech handle");
            return;
        }
        if matches!(
            self.machine.state(),
            PlaybackState::Speaking | PlaybackState::Paused
        ) {
            self.stop(BoundaryHint::Default);
        }

        debug!("Speaking: {}", text);
        self.resume_offset = None;
        self.machine.begin(text);
        self.submit(0);
    }

    fn stop(&mut self, hint: BoundaryHint) {
        let Some(driver) = self.driver.as_mut() else {
            return;
        };
        debug!("Stopping speech ({:?})", hint);

        // A paused handle has to be resumed before its queue can be purged
        if self.native_paused {
            if let Err(e) = driver.resume() {
                warn!("Failed to resume before stop: {}", e);
            }
            self.native_paused = false;
        }
        if let Err(e) = driver.purge() {
            warn!("Failed to purge speech: {}", e);
        }

        self.stream = None;
        self.text_offset = 0;
        self.base_offset = 0;
        self.resume_offset = None;
        self.word_deadline = None;
        self.machine.stop();
    }

    fn pause(&mut self, hint: BoundaryHint) {
        if self.machine.state() != PlaybackState::Speaking || self.native_paused {
            return;
        }
        let Some(driver) = self.driver.as_mut() else {
            return;
        };
        if !self.features.pause {
            // Committed by purging at the next word boundary
            if self.machine.request_pause() {
                debug!("Pause requested ({:?}), handle has no pause", hint);
            }
            return;
        }
        if !driver.is_speaking() {
            return;
        }

        // Handles count pause calls and need as many resumes, so forward
        // at most one pause per resume
        if !self.machine.request_pause() {
            return;
        }
        debug!("Pause requested ({:?})", hint);
        match driver.pause() {
            Ok(()) => self.native_paused = true,
            Err(e) => {
                warn!("Failed to pause: {}", e);
                self.machine.cancel_pause();
            }
        }
    }

    fn resume(&mut self) {
        if self.machine.state() != PlaybackState::Paused {
            return;
        }
        if let Some(offset) = self.resume_offset {
            if self.driver.is_none() {
                return;
            }
            if self.remaining_text(offset).is_none() {
                error!("Cannot resume from offset {}", offset);
                self.resume_offset = None;
                self.machine
                    .fail(ErrorReason::Input, "Speech synthesizing failure.");
                return;
            }
            self.resume_offset = None;
            self.machine.resume();
            self.submit(offset);
            return;
        }

        let interval = self.word_interval();
        let Some(driver) = self.driver.as_mut() else {
            return;
        };
        if self.native_paused {
            if let Err(e) = driver.resume() {
                warn!("Failed to resume: {}", e);
                return;
            }
            self.native_paused = false;
        }
        self.machine.resume();
        if self.tracks_words() {
            self.word_deadline = Some(Instant::now() + interval);
        }
    }

    fn rate(&self) -> f64 {
        self.rate
    }

    fn set_rate(&mut self, rate: f64) -> bool {
        if !in_range(rate, -1.0, 1.0) {
            return false;
        }
        let Some(driver) = self.driver.as_mut() else {
            return false;
        };
        match driver.set_rate(rate) {
            Ok(()) => {
                self.rate = rate;
                if self.word_deadline.is_some() {
                    self.word_deadline = Some(Instant::now() + self.word_interval());
                }
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
        if self.features.inline_pitch_markup {
            // Applied through markup on the next utterance
            self.pitch = pitch;
            return true;
        }
        let Some(driver) = self.driver.as_mut() else {
            return false;
        };
        match driver.set_pitch(pitch) {
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
        let Some(driver) = self.driver.as_mut() else {
            return false;
        };
        match driver.set_volume(volume) {
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
        self.voice().map(|voice| voice.locale().clone())
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
        let token = self.driver.as_ref()?.current_voice_token()?;
        self.catalog.find_by_token(&token).cloned()
    }

    fn set_voice(&mut self, voice: &Voice) -> bool {
        if let Err(e) = self.catalog.select(voice, voice.locale()) {
            warn!("{}", e);
            self.machine.reject(ErrorReason::Configuration, &e.to_string());
            return false;
        }
        let Some(driver) = self.driver.as_mut() else {
            return false;
        };
        if let Err(e) = driver.set_voice_token(voice.token()) {
            warn!("Failed to set voice token {}: {}", voice.token(), e);
            self.machine
                .reject(ErrorReason::Configuration, "Could not set voice.");
            return false;
        }

        if matches!(
            self.machine.state(),
            PlaybackState::Speaking | PlaybackState::Paused
        ) {
            self.stop(BoundaryHint::Default);
        }
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
        let poll = match self.machine.state() {
            PlaybackState::Speaking => Some(Instant::now() + POLL_INTERVAL),
            // A purged handle has nothing left to report until resume
            PlaybackState::Paused if self.stream.is_some() => Some(Instant::now() + POLL_INTERVAL),
            _ => None,
        };
        match (poll, self.word_deadline) {
            (Some(poll), Some(word)) => Some(poll.min(word)),
            (poll, word) => poll.or(word),
        }
    }

    fn process(&mut self, now: Instant) {
        if self.driver.is_none() {
            return;
        }
        while let Some(deadline) = self.word_deadline {
            if deadline > now || self.machine.state() != PlaybackState::Speaking {
                break;
            }
            self.word_deadline = Some(deadline + self.word_interval());
            self.on_word_timer();
        }

        let mut events = Vec::new();
        match self.driver.as_mut() {
            Some(driver) => {
                while let Some(event) = driver.poll_event() {
                    events.push(event);
                }
            }
            None => return,
        }

        let mut saw_current = false;
        for event in events {
            if self.stream != Some(event.stream) {
                debug!("Dropping stale event for stream {}", event.stream);
                continue;
            }
            saw_current = true;
            self.handle_event(event);
        }

        let speaking = self
            .driver
            .as_ref()
            .map(|driver| driver.is_speaking())
            .unwrap_or(false);

        if self.machine.state() == PlaybackState::Speaking {
            if self.native_paused && self.machine.pause_pending() && (saw_current || !speaking) {
                // Commit the pause at this notification batch
                self.word_deadline = None;
                self.machine.enter_paused();
            } else if !self.features.utterance_events && !speaking && !self.native_paused {
                // No end-of-stream notification to wait for
                self.flush_tracked_words();
                self.stream = None;
                self.machine.finish();
            }
        }
    }

    fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.machine.drain_events()
    }
}
