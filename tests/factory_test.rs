//! Engine factory tests
//!
//! Kept in one test because the native runtime is process-wide state.

use speechmux::config::Config;
use speechmux::platform::{runtime_active, NativeRuntime};
use speechmux::speech::{create_engine, ErrorReason, PlaybackState};

fn config_for(backend: &str) -> Config {
    let mut config = Config::defaults();
    config.set("speech", "backend", backend);
    config
}

#[test]
fn test_factory_backends_and_runtime() {
    assert!(!runtime_active());

    // Native engines need the runtime
    let native = create_engine(&config_for("native"));
    assert_eq!(native.name(), "native");
    assert_eq!(native.state(), PlaybackState::Error);
    assert_eq!(native.error_reason(), ErrorReason::Initialization);
    assert!(native.available_locales().is_empty());

    // Auto falls back to the mock
    let auto = create_engine(&config_for("auto"));
    assert_eq!(auto.name(), "mock");
    assert_eq!(auto.state(), PlaybackState::Ready);

    let mock = create_engine(&config_for("mock"));
    assert_eq!(mock.name(), "mock");
    assert_eq!(mock.available_locales().len(), 3);

    let runtime = NativeRuntime::acquire();
    assert!(runtime_active());
    {
        // Depends on the host having a synthesizer; either way the
        // factory hands back a usable engine
        let engine = create_engine(&config_for("auto"));
        match engine.name() {
            "native" => {
                println!("✓ Native speech engine available");
                assert_ne!(engine.state(), PlaybackState::Error);
            }
            name => {
                println!("⚠ Native speech engine unavailable (may be expected)");
                assert_eq!(name, "mock");
            }
        }
    }
    drop(runtime);
    assert!(!runtime_active());
}
