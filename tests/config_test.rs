//! Configuration loading tests
//!
//! Each test works in its own temporary directory so the user's
//! ~/.speechmux.cfg is never touched.

use speechmux::config::Config;
use speechmux::speech::{BackendKind, Locale};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_missing_file_is_created_with_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("speechmux.cfg");
    let config = Config::load_from(&path).expect("Failed to load config");

    assert!(path.exists());
    assert_eq!(config.path(), path.as_path());
    assert_eq!(config.backend(), BackendKind::Auto);
    assert_eq!(config.mock_word_interval_ms(), 100);

    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("[speech]"));
    assert!(written.contains("[mock]"));
}

#[test]
fn test_existing_file_values() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("speechmux.cfg");
    fs::write(
        &path,
        "[speech]\nbackend=mock\nlocale=fi-FI\nvoice=Anneli\nrate=0.5\npitch=-0.25\nvolume=0.8\n\
         [mock]\nword_interval_ms=20\nfail_init=true\n",
    )
    .unwrap();

    let config = Config::load_from(&path).expect("Failed to load config");
    assert_eq!(config.backend(), BackendKind::Mock);
    assert_eq!(config.locale(), Some(Locale::new("fi", Some("FI"))));
    assert_eq!(config.voice_name().as_deref(), Some("Anneli"));
    assert_eq!(config.rate(), Some(0.5));
    assert_eq!(config.pitch(), Some(-0.25));
    assert_eq!(config.volume(), Some(0.8));
    assert_eq!(config.mock_word_interval_ms(), 20);
    assert!(config.mock_fail_init());
}

#[test]
fn test_save_round_trips_changes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("speechmux.cfg");
    let mut config = Config::load_from(&path).expect("Failed to load config");
    config.set("speech", "voice", "Eivind");
    config.save().expect("Failed to save config");

    let reloaded = Config::load_from(&path).expect("Failed to reload config");
    assert_eq!(reloaded.voice_name().as_deref(), Some("Eivind"));
}

#[test]
fn test_malformed_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("speechmux.cfg");
    fs::write(&path, "[speech\nbackend=mock\n").unwrap();
    assert!(Config::load_from(&path).is_err());
}

#[test]
fn test_huge_word_interval_is_clamped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("speechmux.cfg");
    fs::write(&path, "[mock]\nword_interval_ms=99999999999999\n").unwrap();

    let config = Config::load_from(&path).expect("Failed to load config");
    assert_eq!(config.mock_word_interval_ms(), speechmux::speech::MAX_WORD_INTERVAL_MS);
}
