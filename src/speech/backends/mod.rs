//! Speech backends

// Timer-driven backend with a fixed voice table
pub mod mock;

// Desktop synthesizer engine over a native driver handle
pub mod native;

// Native driver built on the tts crate (cross-platform)
pub mod system;

// Mobile platform synthesizer behind a foreign-function bridge
pub mod android;
