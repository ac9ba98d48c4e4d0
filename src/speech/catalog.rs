//! Catalog of the voices a backend offers, grouped by locale

use super::voice::{Locale, Voice};
use std::collections::BTreeMap;
use std::fmt;

/// Why a voice could not be selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// The voice's derived locale has no voices in this catalog
    UnknownLocale(Locale),
    /// The locale is known but the exact voice is not listed under it
    UnknownVoice { name: String, locale: Locale },
}

impl fmt::Display for SelectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionError::UnknownLocale(locale) => {
                write!(f, "Engine does not support voice's locale {}", locale)
            }
            SelectionError::UnknownVoice { name, locale } => {
                write!(f, "Engine does not support voice {} in the locale {}", name, locale)
            }
        }
    }
}

/// Voices available from the active backend
///
/// Locales enumerate in sorted order and voices in insertion order, so
/// listings are reproducible across runs. The catalog is rebuilt wholesale
/// when the backend's voice source changes.
#[derive(Debug, Clone, Default)]
pub struct VoiceCatalog {
    voices: BTreeMap<Locale, Vec<Voice>>,
}

impl VoiceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a flat voice list
    pub fn from_voices<I: IntoIterator<Item = Voice>>(voices: I) -> Self {
        let mut catalog = Self::new();
        for voice in voices {
            catalog.insert(voice);
        }
        catalog
    }

    /// Add a voice under its own locale; exact duplicates are dropped
    pub fn insert(&mut self, voice: Voice) {
        let entry = self.voices.entry(voice.locale().clone()).or_default();
        if !entry.contains(&voice) {
            entry.push(voice);
        }
    }

    /// Replace the whole catalog contents
    pub fn rebuild<I: IntoIterator<Item = Voice>>(&mut self, voices: I) {
        *self = Self::from_voices(voices);
    }

    pub fn locales(&self) -> Vec<Locale> {
        self.voices.keys().cloned().collect()
    }

    /// Voices for a locale, empty when the locale is unknown
    pub fn voices_for(&self, locale: &Locale) -> Vec<Voice> {
        self.voices.get(locale).cloned().unwrap_or_default()
    }

    pub fn contains_locale(&self, locale: &Locale) -> bool {
        self.voices.contains_key(locale)
    }

    /// Exact membership by full identity tuple
    pub fn contains(&self, voice: &Voice) -> bool {
        self.voices
            .get(voice.locale())
            .map(|voices| voices.contains(voice))
            .unwrap_or(false)
    }

    /// Default voice for a locale (first listed)
    pub fn first_voice(&self, locale: &Locale) -> Option<&Voice> {
        self.voices.get(locale).and_then(|voices| voices.first())
    }

    pub fn find_by_token(&self, token: &str) -> Option<&Voice> {
        self.voices
            .values()
            .flatten()
            .find(|voice| voice.token() == token)
    }

    /// Validate a voice for selection under its derived locale
    ///
    /// The locale must be known and the voice must be listed under it by
    /// full identity. Partial matches are rejected, never coerced.
    pub fn select(&self, voice: &Voice, derived: &Locale) -> Result<&Voice, SelectionError> {
        let voices = self
            .voices
            .get(derived)
            .ok_or_else(|| SelectionError::UnknownLocale(derived.clone()))?;

        voices
            .iter()
            .find(|candidate| *candidate == voice)
            .ok_or_else(|| SelectionError::UnknownVoice {
                name: voice.name().to_string(),
                locale: derived.clone(),
            })
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Total number of voices across all locales
    pub fn len(&self) -> usize {
        self.voices.values().map(Vec::len).sum()
    }
}
