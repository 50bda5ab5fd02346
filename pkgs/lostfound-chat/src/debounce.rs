//! Client-side typing debounce
//!
//! Turns a stream of keystrokes into the few `set_typing` calls the tracker
//! needs: `true` on the first keystroke after idle, `false` once the user
//! has been quiet for the debounce window or as soon as the message is sent.

use std::time::Duration;
use tokio::time::Instant;

/// What the client should report to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
}

impl TypingSignal {
    pub fn is_typing(self) -> bool {
        matches!(self, TypingSignal::Start)
    }
}

/// Debounce state machine for one composer
#[derive(Debug, Clone)]
pub struct TypingDebouncer {
    window: Duration,
    last_keystroke: Option<Instant>,
}

impl TypingDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_keystroke: None,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.last_keystroke.is_some()
    }

    /// A key was pressed; returns `Start` when leaving idle
    pub fn keystroke(&mut self) -> Option<TypingSignal> {
        let was_idle = self.last_keystroke.is_none();
        self.last_keystroke = Some(Instant::now());
        was_idle.then_some(TypingSignal::Start)
    }

    /// When the pending `Stop` is due, if the user is typing
    pub fn deadline(&self) -> Option<Instant> {
        self.last_keystroke.map(|t| t + self.window)
    }

    /// Returns `Stop` once the window has passed without a keystroke
    pub fn poll(&mut self) -> Option<TypingSignal> {
        match self.deadline() {
            Some(deadline) if Instant::now() >= deadline => {
                self.last_keystroke = None;
                Some(TypingSignal::Stop)
            }
            _ => None,
        }
    }

    /// The message was sent; returns `Stop` right away if typing
    pub fn sent(&mut self) -> Option<TypingSignal> {
        self.last_keystroke
            .take()
            .map(|_| TypingSignal::Stop)
    }
}
