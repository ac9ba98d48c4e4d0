//! Configuration management

use crate::speech::engine::{BackendKind, MAX_WORD_INTERVAL_MS};
use crate::speech::voice::Locale;
use crate::{Result, SpeechError};
use ini::Ini;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Persistent speech settings
///
/// Values are read on demand from the INI document, so edits made through
/// [`set`](Config::set) take effect on the next getter call.
pub struct Config {
    /// INI configuration storage
    ini: Ini,

    /// Config file path (~/.speechmux.cfg unless loaded explicitly)
    path: PathBuf,
}

impl Config {
    /// Load configuration from the home directory, creating a default file
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, creating it with defaults if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);

        let ini = if path.exists() {
            Ini::load_from_file(path)
                .map_err(|e| SpeechError::IniParse(format!("Failed to load config: {}", e)))?
        } else {
            info!("Config file not found, creating default");
            let default = Self::default_config();
            default
                .write_to_file(path)
                .map_err(|e| SpeechError::IniParse(format!("Failed to write config: {}", e)))?;
            default
        };

        Ok(Self {
            ini,
            path: path.to_path_buf(),
        })
    }

    /// In-memory defaults, not backed by a file on disk until saved
    pub fn defaults() -> Self {
        Self {
            ini: Self::default_config(),
            path: Self::config_path(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        debug!("Saving config to {:?}", self.path);
        self.ini
            .write_to_file(&self.path)
            .map_err(|e| SpeechError::Config(format!("Failed to save config: {}", e)))
    }

    fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".speechmux.cfg")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn default_config() -> Ini {
        let mut ini = Ini::new();

        ini.with_section(Some("speech"))
            .set("backend", "auto")
            .set("rate", "0.0")
            .set("pitch", "0.0")
            .set("volume", "1.0");

        ini.with_section(Some("mock"))
            .set("word_interval_ms", "100")
            .set("fail_init", "false");

        ini
    }

    /// Get a boolean value from config
    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Get a string value from config
    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.ini
            .get_from(Some(section), key)
            .unwrap_or(default)
            .to_string()
    }

    /// Get a float value, `None` when missing or unparsable
    pub fn get_float(&self, section: &str, key: &str) -> Option<f64> {
        let raw = self.ini.get_from(Some(section), key)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring [{}] {} = {:?}: not a number", section, key, raw);
                None
            }
        }
    }

    /// Set a value in config
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.ini.with_section(Some(section)).set(key, value);
    }

    // Speech settings

    /// Which backend to create; unknown names fall back to auto
    pub fn backend(&self) -> BackendKind {
        let name = self.get_string("speech", "backend", "auto");
        BackendKind::parse(&name).unwrap_or_else(|| {
            warn!("Unknown backend {:?}, using auto", name);
            BackendKind::Auto
        })
    }

    /// Speech rate in [-1, 1]; range checking is left to the engine
    pub fn rate(&self) -> Option<f64> {
        self.get_float("speech", "rate")
    }

    pub fn pitch(&self) -> Option<f64> {
        self.get_float("speech", "pitch")
    }

    pub fn volume(&self) -> Option<f64> {
        self.get_float("speech", "volume")
    }

    /// Preferred locale, `None` when unset or not a valid tag
    pub fn locale(&self) -> Option<Locale> {
        let tag = self.ini.get_from(Some("speech"), "locale")?.trim();
        if tag.is_empty() {
            return None;
        }
        match Locale::parse(tag) {
            Ok(locale) => Some(locale),
            Err(e) => {
                warn!("Ignoring configured locale: {}", e);
                None
            }
        }
    }

    /// Preferred voice display name
    pub fn voice_name(&self) -> Option<String> {
        self.ini
            .get_from(Some("speech"), "voice")
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }

    // Mock backend settings

    /// Per-word interval at rate 0, capped at [`MAX_WORD_INTERVAL_MS`]
    pub fn mock_word_interval_ms(&self) -> u64 {
        let ms = self
            .ini
            .get_from(Some("mock"), "word_interval_ms")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|&ms| ms > 0)
            .unwrap_or(100);
        if ms > MAX_WORD_INTERVAL_MS {
            warn!("word_interval_ms {} too large, using {}", ms, MAX_WORD_INTERVAL_MS);
        }
        ms.min(MAX_WORD_INTERVAL_MS)
    }

    /// Start the mock in the Error state
    pub fn mock_fail_init(&self) -> bool {
        self.get_bool("mock", "fail_init", false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::defaults();
        assert_eq!(config.backend(), BackendKind::Auto);
        assert_eq!(config.rate(), Some(0.0));
        assert_eq!(config.volume(), Some(1.0));
        assert_eq!(config.locale(), None);
        assert_eq!(config.voice_name(), None);
        assert_eq!(config.mock_word_interval_ms(), 100);
        assert!(!config.mock_fail_init());
    }

    #[test]
    fn test_set_and_read_back() {
        let mut config = Config::defaults();
        config.set("speech", "backend", "Mock");
        config.set("speech", "locale", "nb_NO");
        config.set("speech", "voice", " Kjersti ");
        config.set("speech", "rate", "-0.5");
        config.set("mock", "word_interval_ms", "40");
        config.set("mock", "fail_init", "true");

        assert_eq!(config.backend(), BackendKind::Mock);
        assert_eq!(config.locale(), Some(Locale::new("nb", Some("NO"))));
        assert_eq!(config.voice_name().as_deref(), Some("Kjersti"));
        assert_eq!(config.rate(), Some(-0.5));
        assert_eq!(config.mock_word_interval_ms(), 40);
        assert!(config.mock_fail_init());
    }

    #[test]
    fn test_bad_values_fall_back() {
        let mut config = Config::defaults();
        config.set("speech", "backend", "sapi5");
        config.set("speech", "pitch", "high");
        config.set("speech", "locale", "1");
        config.set("mock", "word_interval_ms", "0");
        config.set("mock", "fail_init", "maybe");

        assert_eq!(config.backend(), BackendKind::Auto);
        assert_eq!(config.pitch(), None);
        assert_eq!(config.locale(), None);
        assert_eq!(config.mock_word_interval_ms(), 100);
        assert!(!config.mock_fail_init());

        config.set("mock", "word_interval_ms", "-5");
        assert_eq!(config.mock_word_interval_ms(), 100);
        config.set("mock", "word_interval_ms", "86400000");
        assert_eq!(config.mock_word_interval_ms(), MAX_WORD_INTERVAL_MS);
    }
}
