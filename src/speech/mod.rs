//! Speech synthesis system

pub mod backends;
pub mod boundary;
pub mod catalog;
pub mod engine;
pub mod report;
pub mod state;
pub mod voice;

pub use boundary::{WordBoundaryTracker, WordSpan};
pub use catalog::{SelectionError, VoiceCatalog};
pub use engine::{
    apply_settings, create_engine, BackendKind, BoundaryHint, Engine, MAX_WORD_INTERVAL_MS,
};
pub use report::ErrorReason;
pub use state::{EngineEvent, PlaybackState};
pub use voice::{Age, Gender, Locale, Voice};
