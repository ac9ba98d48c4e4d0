//! Playback lifecycle shared by every engine
//!
//! The state machine owns the current state, the utterance being spoken,
//! the latest error, and the queue of events waiting for the client.
//! Engines drive it from commands and backend notifications; it decides
//! which transitions are legal and emits events in transition order.

use super::boundary::WordSpan;
use super::report::{ErrorReason, ErrorReporter};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Ready,
    Speaking,
    Paused,
    Error,
}

/// Notification delivered to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineEvent {
    StateChanged(PlaybackState),
    /// Byte offset and length of the word now being spoken
    SayingWord { start: usize, length: usize },
    ErrorOccurred { reason: ErrorReason, message: String },
}

/// The utterance currently in progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSession {
    text: String,
    cursor: usize,
    pause_requested: bool,
}

impl PlaybackSession {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            cursor: 0,
            pause_requested: false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Byte offset where the next word starts
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn pause_requested(&self) -> bool {
        self.pause_requested
    }
}

/// Result of feeding one word into the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordOutcome {
    /// More text remains and no pause was pending
    Continue,
    /// The cursor reached the end; state is now Ready
    Finished,
    /// A pending pause committed at this boundary
    Paused,
    /// Not speaking, nothing emitted
    Ignored,
}

#[derive(Debug, Default)]
pub struct PlaybackStateMachine {
    state: PlaybackState,
    session: Option<PlaybackSession>,
    errors: ErrorReporter,
    events: VecDeque<EngineEvent>,
}

impl PlaybackStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Active utterance, `None` when nothing is being spoken
    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn error_reason(&self) -> ErrorReason {
        self.errors.reason()
    }

    pub fn error_string(&self) -> &str {
        self.errors.message()
    }

    pub fn pause_pending(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.pause_requested)
            .unwrap_or(false)
    }

    /// Take all queued events in the order they were emitted
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.events.drain(..).collect()
    }

    fn set_state(&mut self, state: PlaybackState) -> bool {
        if self.state == state {
            return false;
        }
        debug!("Playback state {:?} -> {:?}", self.state, state);
        self.state = state;
        self.events.push_back(EngineEvent::StateChanged(state));
        true
    }

    /// Accept a new utterance and enter Speaking
    ///
    /// Callers stop any previous utterance first. Accepting from Error
    /// clears the error record.
    pub fn begin(&mut self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        if self.state == PlaybackState::Error {
            self.errors.clear();
        }
        self.session = Some(PlaybackSession::new(text));
        self.set_state(PlaybackState::Speaking);
        true
    }

    /// Report a word located by a tracker and advance the cursor past it
    ///
    /// Commits a pending pause or finishes the utterance at this boundary.
    pub fn word_consumed(&mut self, span: WordSpan) -> WordOutcome {
        if self.state != PlaybackState::Speaking {
            return WordOutcome::Ignored;
        }
        let Some(session) = self.session.as_mut() else {
            return WordOutcome::Ignored;
        };

        if span.length > 0 {
            self.events.push_back(EngineEvent::SayingWord {
                start: span.start,
                length: span.length,
            });
        }
        session.cursor = span.next;
        let done = session.cursor >= session.text.len();
        let pause = std::mem::take(&mut session.pause_requested);

        if done {
            self.finish();
            WordOutcome::Finished
        } else if pause {
            self.set_state(PlaybackState::Paused);
            WordOutcome::Paused
        } else {
            WordOutcome::Continue
        }
    }

    /// Report a word announced by a backend's own boundary events
    ///
    /// Unlike [`word_consumed`](Self::word_consumed) this never changes
    /// state; the backend reports completion separately.
    pub fn word_reported(&mut self, start: usize, length: usize) -> bool {
        if self.state != PlaybackState::Speaking {
            return false;
        }
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        session.cursor = start + length;
        self.events.push_back(EngineEvent::SayingWord { start, length });
        true
    }

    /// The utterance ran to completion
    pub fn finish(&mut self) {
        self.session = None;
        self.set_state(PlaybackState::Ready);
    }

    /// Mark a pause to be applied at the next word boundary
    ///
    /// Only meaningful while Speaking; returns false when the request was
    /// a no-op (not speaking, or already pending).
    pub fn request_pause(&mut self) -> bool {
        if self.state != PlaybackState::Speaking {
            return false;
        }
        match self.session.as_mut() {
            Some(session) if !session.pause_requested => {
                session.pause_requested = true;
                true
            }
            _ => false,
        }
    }

    /// Drop a pause that has not committed yet
    pub fn cancel_pause(&mut self) -> bool {
        match self.session.as_mut() {
            Some(session) if session.pause_requested => {
                session.pause_requested = false;
                true
            }
            _ => false,
        }
    }

    /// Commit a pending pause decided by the engine rather than a tracker
    pub fn enter_paused(&mut self) -> bool {
        if self.state != PlaybackState::Speaking {
            return false;
        }
        if let Some(session) = self.session.as_mut() {
            session.pause_requested = false;
        }
        self.set_state(PlaybackState::Paused)
    }

    /// Leave Paused; a no-op in every other state
    pub fn resume(&mut self) -> bool {
        if self.state != PlaybackState::Paused {
            return false;
        }
        self.set_state(PlaybackState::Speaking)
    }

    /// Abandon the utterance and return to Ready from any state
    pub fn stop(&mut self) -> bool {
        self.session = None;
        if self.state == PlaybackState::Error {
            self.errors.clear();
        }
        self.set_state(PlaybackState::Ready)
    }

    /// Unrecoverable failure: drop the utterance and enter Error
    pub fn fail(&mut self, reason: ErrorReason, message: &str) {
        self.session = None;
        self.errors.record(reason, message);
        self.set_state(PlaybackState::Error);
        self.events.push_back(EngineEvent::ErrorOccurred {
            reason,
            message: message.to_string(),
        });
    }

    /// Per-call failure: record it without touching the state
    pub fn reject(&mut self, reason: ErrorReason, message: &str) {
        self.errors.record(reason, message);
    }

    /// Successful reconfiguration clears the error and leaves Error
    pub fn recover(&mut self) {
        if self.errors.has_error() {
            debug!("Clearing {:?} error", self.errors.reason());
            self.errors.clear();
        }
        if self.state == PlaybackState::Error {
            self.set_state(PlaybackState::Ready);
        }
    }
}
