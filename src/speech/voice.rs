//! Engine-independent voice model
//!
//! Backends report voices in their own token space; these types are the
//! platform-neutral identity every engine maps onto.

use crate::{Result, SpeechError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Language plus optional region, e.g. `en-GB`
///
/// Language subtags are kept lowercase and region subtags uppercase so
/// that `en_gb`, `EN-GB` and `en-GB` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Locale {
    language: String,
    region: Option<String>,
}

impl Locale {
    /// Build a locale from a language and optional region subtag
    pub fn new(language: &str, region: Option<&str>) -> Self {
        Self {
            language: language.to_ascii_lowercase(),
            region: region.map(|r| r.to_ascii_uppercase()),
        }
    }

    /// Parse a BCP-47 style tag (`en`, `en-GB`, `en_GB`)
    ///
    /// Script and variant subtags are ignored; only language and region
    /// take part in identity.
    pub fn parse(tag: &str) -> Result<Self> {
        let mut parts = tag.trim().split(['-', '_']);
        let language = parts.next().unwrap_or("");
        if language.len() < 2
            || language.len() > 3
            || !language.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(SpeechError::InvalidLocale(tag.to_string()));
        }

        // Region is the first 2-letter or 3-digit subtag after the language
        let region = parts.find(|p| {
            (p.len() == 2 && p.chars().all(|c| c.is_ascii_alphabetic()))
                || (p.len() == 3 && p.chars().all(|c| c.is_ascii_digit()))
        });

        Ok(Self::new(language, region))
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// BCP-47 name (`en-GB`, or `en` without a region)
    pub fn bcp47(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.region {
            Some(region) => write!(f, "{}-{}", self.language, region),
            None => write!(f, "{}", self.language),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Age {
    Adult,
    Other,
}

/// A voice offered by the active backend
///
/// Equality covers the whole identity tuple including the backend token,
/// so two voices with the same display name from different tokens differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Voice {
    name: String,
    locale: Locale,
    gender: Gender,
    age: Age,
    token: String,
}

impl Voice {
    pub fn new(name: &str, locale: Locale, gender: Gender, age: Age, token: &str) -> Self {
        Self {
            name: name.to_string(),
            locale,
            gender,
            age,
            token: token.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    pub fn gender(&self) -> Gender {
        self.gender
    }

    pub fn age(&self) -> Age {
        self.age
    }

    /// Backend-opaque identifier used to reselect this exact voice
    pub fn token(&self) -> &str {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_locale() {
        let locale = Locale::parse("en-GB").unwrap();
        assert_eq!(locale.language(), "en");
        assert_eq!(locale.region(), Some("GB"));
        assert_eq!(locale.bcp47(), "en-GB");
    }

    #[test]
    fn test_parse_normalizes_case_and_separator() {
        assert_eq!(Locale::parse("NB_no").unwrap(), Locale::new("nb", Some("NO")));
        assert_eq!(Locale::parse("fi").unwrap().bcp47(), "fi");
    }

    #[test]
    fn test_parse_skips_script() {
        let locale = Locale::parse("zh-Hans-CN").unwrap();
        assert_eq!(locale, Locale::new("zh", Some("CN")));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Locale::parse("").is_err());
        assert!(Locale::parse("e").is_err());
        assert!(Locale::parse("12-GB").is_err());
    }

    #[test]
    fn test_voice_equality_includes_token() {
        let locale = Locale::new("en", Some("GB"));
        let a = Voice::new("Bob", locale.clone(), Gender::Male, Age::Adult, "en-GB-1");
        let b = Voice::new("Bob", locale, Gender::Male, Age::Adult, "en-GB-9");
        assert_ne!(a, b);
    }
}
