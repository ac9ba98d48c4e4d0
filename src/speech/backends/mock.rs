//! Deterministic mock backend
//!
//! Speaks nothing. A word timer walks the text with the boundary tracker
//! and reports one word per tick, which gives reproducible word timing for
//! tests and for running without any synthesizer installed.

use crate::speech::boundary::WordBoundaryTracker;
use crate::speech::catalog::VoiceCatalog;
use crate::speech::engine::{in_range, word_interval, BoundaryHint, Engine};
use crate::speech::report::ErrorReason;
use crate::speech::state::{EngineEvent, PlaybackState, PlaybackStateMachine, WordOutcome};
use crate::speech::voice::{Age, Gender, Locale, Voice};
use log::{debug, warn};
use std::time::{Duration, Instant};

/// Fixed voice table: (locale, male voice, female voice)
const VOICE_TABLE: &[(&str, &str, &str)] = &[
    ("en-GB", "Bob", "Anne"),
    ("nb-NO", "Eivind", "Kjersti"),
    ("fi-FI", "Kari", "Anneli"),
];

/// Tuning for the mock backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockOptions {
    /// Time per word at rate 0.0
    pub word_interval_ms: u64,
    /// Start in the Error state as if the engine failed to initialize
    pub fail_init: bool,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            word_interval_ms: 100,
            fail_init: false,
        }
    }
}

pub struct MockEngine {
    catalog: VoiceCatalog,
    tracker: WordBoundaryTracker,
    machine: PlaybackStateMachine,
    locale: Locale,
    voice: Option<Voice>,
    rate: f64,
    pitch: f64,
    volume: f64,
    word_interval_ms: u64,
    /// Next word tick, `None` when the timer is stopped
    deadline: Option<Instant>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::with_options(MockOptions::default())
    }

    pub fn with_options(options: MockOptions) -> Self {
        let catalog = VoiceCatalog::from_voices(Self::voice_table());
        let locales = catalog.locales();
        // The table is non-empty, so there is always a first locale
        let locale = locales
            .iter()
            .find(|l| l.bcp47() == VOICE_TABLE[0].0)
            .or_else(|| locales.first())
            .cloned()
            .unwrap_or_else(|| Locale::new("en", Some("GB")));
        let voice = catalog.first_voice(&locale).cloned();

        let mut engine = Self {
            catalog,
            tracker: WordBoundaryTracker::new(),
            machine: PlaybackStateMachine::new(),
            locale,
            voice,
            rate: 0.0,
            pitch: 0.0,
            volume: 1.0,
            word_interval_ms: options.word_interval_ms,
            deadline: None,
        };

        if options.fail_init {
            engine.machine.fail(
                ErrorReason::Initialization,
                "Could not initialize text-to-speech engine.",
            );
        }
        engine
    }

    fn voice_table() -> Vec<Voice> {
        let mut voices = Vec::new();
        for (tag, male, female) in VOICE_TABLE {
            let Ok(locale) = Locale::parse(tag) else {
                continue;
            };
            voices.push(Voice::new(
                male,
                locale.clone(),
                Gender::Male,
                Age::Adult,
                &format!("{}-1", tag),
            ));
            voices.push(Voice::new(
                female,
                locale,
                Gender::Female,
                Age::Adult,
                &format!("{}-2", tag),
            ));
        }
        voices
    }

    /// Per-word interval; higher rate means shorter words
    pub fn word_interval(&self) -> Duration {
        word_interval(self.word_interval_ms, self.rate)
    }

    fn start_timer(&mut self) {
        self.deadline = Some(Instant::now() + self.word_interval());
    }

    /// Locale is the token up to its last `-` (`en-GB-1` -> `en-GB`)
    fn token_locale(voice: &Voice) -> Option<Locale> {
        let (prefix, _) = voice.token().rsplit_once('-')?;
        Locale::parse(prefix).ok()
    }

    fn on_word_timer(&mut self) {
        let Some(session) = self.machine.session() else {
            self.deadline = None;
            return;
        };

        let outcome = match self.tracker.next_word(session.text(), session.cursor()) {
            Some(span) => self.machine.word_consumed(span),
            None => {
                // Only separators left
                self.machine.finish();
                WordOutcome::Finished
            }
        };

        if outcome != WordOutcome::Continue {
            debug!("Word timer stopped: {:?}", outcome);
            self.deadline = None;
        }
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available_locales(&self) -> Vec<Locale> {
        self.catalog.locales()
    }

    fn available_voices(&self) -> Vec<Voice> {
        self.catalog.voices_for(&self.locale)
    }

    fn speak(&mut self, text: &str) {
        if text.is_empty() {
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
        self.start_timer();
    }

    fn stop(&mut self, hint: BoundaryHint) {
        debug!("Stopping speech ({:?})", hint);
        self.deadline = None;
        self.machine.stop();
    }

    fn pause(&mut self, hint: BoundaryHint) {
        if self.machine.request_pause() {
            debug!("Pause requested ({:?}), applies after current word", hint);
        }
    }

    fn resume(&mut self) {
        if self.machine.resume() {
            self.start_timer();
        }
    }

    fn rate(&self) -> f64 {
        self.rate
    }

    fn set_rate(&mut self, rate: f64) -> bool {
        if !in_range(rate, -1.0, 1.0) {
            return false;
        }
        self.rate = rate;
        if self.deadline.is_some() {
            self.start_timer();
        }
        true
    }

    fn pitch(&self) -> f64 {
        self.pitch
    }

    fn set_pitch(&mut self, pitch: f64) -> bool {
        if !in_range(pitch, -1.0, 1.0) {
            return false;
        }
        self.pitch = pitch;
        true
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn set_volume(&mut self, volume: f64) -> bool {
        if !in_range(volume, 0.0, 1.0) {
            return false;
        }
        self.volume = volume;
        true
    }

    fn locale(&self) -> Option<Locale> {
        Some(self.locale.clone())
    }

    fn set_locale(&mut self, locale: &Locale) -> bool {
        if !self.catalog.contains_locale(locale) {
            self.machine.reject(
                ErrorReason::Configuration,
                &format!("No voice found for locale {}.", locale),
            );
            return false;
        }

        self.locale = locale.clone();
        let keeps_voice = self
            .voice
            .as_ref()
            .map(|v| v.locale() == locale)
            .unwrap_or(false);
        if !keeps_voice {
            self.voice = self.catalog.first_voice(locale).cloned();
        }
        self.machine.recover();
        true
    }

    fn voice(&self) -> Option<Voice> {
        self.voice.clone()
    }

    fn set_voice(&mut self, voice: &Voice) -> bool {
        let Some(derived) = Self::token_locale(voice) else {
            warn!("Voice token {} carries no locale", voice.token());
            self.machine
                .reject(ErrorReason::Configuration, "Could not set voice.");
            return false;
        };

        if let Err(e) = self.catalog.select(voice, &derived) {
            warn!("{}", e);
            self.machine.reject(ErrorReason::Configuration, &e.to_string());
            return false;
        }

        self.locale = derived;
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
        self.deadline
    }

    fn process(&mut self, now: Instant) {
        while let Some(deadline) = self.deadline {
            if deadline > now {
                break;
            }
            self.deadline = Some(deadline + self.word_interval());
            self.on_word_timer();
        }
    }

    fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.machine.drain_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fire exactly the next scheduled word tick
    fn tick(engine: &mut MockEngine) {
        let deadline = engine.next_deadline().expect("timer should be running");
        engine.process(deadline);
    }

    fn words(events: &[EngineEvent]) -> Vec<(usize, usize)> {
        events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::SayingWord { start, length } => Some((*start, *length)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_initial_voice_and_locale() {
        let engine = MockEngine::new();
        assert_eq!(engine.locale().unwrap().bcp47(), "en-GB");
        assert_eq!(engine.voice().unwrap().name(), "Bob");
        assert_eq!(engine.state(), PlaybackState::Ready);
        assert_eq!(engine.available_locales().len(), 3);
        assert_eq!(engine.available_voices().len(), 2);
    }

    #[test]
    fn test_voice_tokens() {
        let engine = MockEngine::new();
        let tokens: Vec<String> = engine
            .available_voices()
            .iter()
            .map(|v| v.token().to_string())
            .collect();
        assert_eq!(tokens, vec!["en-GB-1", "en-GB-2"]);
    }

    #[test]
    fn test_hello_world_words() {
        let mut engine = MockEngine::new();
        engine.speak("Hello, world!");
        assert_eq!(engine.state(), PlaybackState::Speaking);

        tick(&mut engine);
        assert_eq!(engine.state(), PlaybackState::Speaking);
        tick(&mut engine);
        assert_eq!(engine.state(), PlaybackState::Ready);
        assert!(engine.next_deadline().is_none());

        let events = engine.drain_events();
        assert_eq!(words(&events), vec![(0, 5), (7, 5)]);
        assert_eq!(
            events.first(),
            Some(&EngineEvent::StateChanged(PlaybackState::Speaking))
        );
        assert_eq!(
            events.last(),
            Some(&EngineEvent::StateChanged(PlaybackState::Ready))
        );
    }

    #[test]
    fn test_process_fires_all_due_ticks() {
        let mut engine = MockEngine::new();
        engine.speak("one two three");
        engine.process(Instant::now() + Duration::from_secs(10));
        assert_eq!(engine.state(), PlaybackState::Ready);
        assert_eq!(words(&engine.drain_events()).len(), 3);
    }

    #[test]
    fn test_process_before_deadline_does_nothing() {
        let mut engine = MockEngine::new();
        engine.speak("one two");
        engine.drain_events();
        let deadline = engine.next_deadline().unwrap();
        engine.process(deadline - Duration::from_millis(1));
        assert!(engine.drain_events().is_empty());
    }

    #[test]
    fn test_punctuation_only_text_finishes_silently() {
        let mut engine = MockEngine::new();
        engine.speak("?!");
        tick(&mut engine);
        assert_eq!(engine.state(), PlaybackState::Ready);
        assert!(words(&engine.drain_events()).is_empty());
    }

    #[test]
    fn test_pause_deferred_then_resume() {
        let mut engine = MockEngine::new();
        engine.speak("one two three");
        engine.pause(BoundaryHint::Default);
        assert_eq!(engine.state(), PlaybackState::Speaking);

        tick(&mut engine);
        assert_eq!(engine.state(), PlaybackState::Paused);
        assert!(engine.next_deadline().is_none());

        engine.resume();
        assert_eq!(engine.state(), PlaybackState::Speaking);
        tick(&mut engine);
        tick(&mut engine);
        assert_eq!(engine.state(), PlaybackState::Ready);

        let events = engine.drain_events();
        assert_eq!(words(&events), vec![(0, 3), (4, 3), (8, 5)]);
    }

    #[test]
    fn test_speak_while_speaking_restarts() {
        let mut engine = MockEngine::new();
        engine.speak("first utterance");
        tick(&mut engine);
        engine.drain_events();

        engine.speak("second");
        assert_eq!(
            engine.drain_events(),
            vec![
                EngineEvent::StateChanged(PlaybackState::Ready),
                EngineEvent::StateChanged(PlaybackState::Speaking),
            ]
        );
        tick(&mut engine);
        assert_eq!(words(&engine.drain_events()), vec![(0, 6)]);
    }

    #[test]
    fn test_empty_speak_is_noop() {
        let mut engine = MockEngine::new();
        engine.speak("");
        assert_eq!(engine.state(), PlaybackState::Ready);
        assert!(engine.next_deadline().is_none());
    }

    #[test]
    fn test_rate_changes_interval() {
        let mut engine = MockEngine::new();
        assert_eq!(engine.word_interval(), Duration::from_millis(100));
        assert!(engine.set_rate(1.0));
        assert_eq!(engine.word_interval(), Duration::from_millis(50));
        assert!(engine.set_rate(-1.0));
        assert_eq!(engine.word_interval(), Duration::from_millis(150));
        assert!(!engine.set_rate(1.5));
        assert_eq!(engine.rate(), -1.0);
    }

    #[test]
    fn test_rate_change_keeps_cursor() {
        let mut engine = MockEngine::new();
        engine.speak("one two three");
        tick(&mut engine);
        assert!(engine.set_rate(0.5));
        assert!(engine.next_deadline().is_some());
        tick(&mut engine);
        tick(&mut engine);
        assert_eq!(
            words(&engine.drain_events()),
            vec![(0, 3), (4, 3), (8, 5)]
        );
    }

    #[test]
    fn test_set_locale_picks_default_voice() {
        let mut engine = MockEngine::new();
        assert!(engine.set_locale(&Locale::parse("fi-FI").unwrap()));
        assert_eq!(engine.voice().unwrap().name(), "Kari");
        assert_eq!(engine.available_voices()[1].name(), "Anneli");
    }

    #[test]
    fn test_set_locale_unknown_fails() {
        let mut engine = MockEngine::new();
        assert!(!engine.set_locale(&Locale::parse("sv-SE").unwrap()));
        assert_eq!(engine.error_reason(), ErrorReason::Configuration);
        assert_eq!(engine.state(), PlaybackState::Ready);
        assert_eq!(engine.locale().unwrap().bcp47(), "en-GB");
    }

    #[test]
    fn test_set_voice_switches_locale() {
        let mut engine = MockEngine::new();
        engine.set_locale(&Locale::parse("nb-NO").unwrap());
        let kjersti = engine.available_voices()[1].clone();
        engine.set_locale(&Locale::parse("en-GB").unwrap());

        assert!(engine.set_voice(&kjersti));
        assert_eq!(engine.locale().unwrap().bcp47(), "nb-NO");
        assert_eq!(engine.voice(), Some(kjersti));
    }

    #[test]
    fn test_set_voice_rejects_non_member() {
        let mut engine = MockEngine::new();
        let before = engine.voice();
        let fake = Voice::new(
            "Bob",
            Locale::parse("fi-FI").unwrap(),
            Gender::Male,
            Age::Adult,
            "fi-FI-7",
        );
        assert!(!engine.set_voice(&fake));
        assert_eq!(engine.voice(), before);
        assert_eq!(engine.locale().unwrap().bcp47(), "en-GB");
    }

    #[test]
    fn test_fail_init_and_recover() {
        let mut engine = MockEngine::with_options(MockOptions {
            fail_init: true,
            ..MockOptions::default()
        });
        assert_eq!(engine.state(), PlaybackState::Error);
        assert_eq!(engine.error_reason(), ErrorReason::Initialization);

        // Pause is a no-op in Error and keeps the error record
        engine.pause(BoundaryHint::Default);
        assert_eq!(engine.state(), PlaybackState::Error);
        assert_eq!(engine.error_reason(), ErrorReason::Initialization);
        assert_eq!(
            engine.error_string(),
            "Could not initialize text-to-speech engine."
        );
        assert!(engine.drain_events().iter().all(|e| !matches!(
            e,
            EngineEvent::StateChanged(PlaybackState::Paused)
        )));

        let anne = engine.available_voices()[1].clone();
        assert!(engine.set_voice(&anne));
        assert_eq!(engine.state(), PlaybackState::Ready);
        assert_eq!(engine.error_reason(), ErrorReason::NoError);
    }

    #[test]
    fn test_pause_in_ready_keeps_rejection_record() {
        let mut engine = MockEngine::new();
        assert!(!engine.set_locale(&Locale::parse("sv-SE").unwrap()));
        engine.drain_events();

        engine.pause(BoundaryHint::Default);
        assert_eq!(engine.state(), PlaybackState::Ready);
        assert_eq!(engine.error_reason(), ErrorReason::Configuration);
        assert_eq!(engine.error_string(), "No voice found for locale sv-SE.");
        assert!(engine.drain_events().is_empty());
    }

    #[test]
    fn test_huge_interval_does_not_overflow() {
        let mut engine = MockEngine::with_options(MockOptions {
            word_interval_ms: u64::MAX,
            ..MockOptions::default()
        });
        engine.speak("one");
        assert!(engine.next_deadline().is_some());
        assert_eq!(engine.word_interval(), Duration::from_secs(60));
    }
}
