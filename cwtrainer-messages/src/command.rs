use flume::Sender;
use std::time::Duration;

use crate::Hertz;

/// Commands sent from callers to the playback worker.
///
/// Every play request carries its own reply channel so the caller can block
/// until its request has finished sounding.
#[derive(Debug)]
pub enum Command {
    /// Play a single tone of fixed length.
    PlayTone {
        frequency: Hertz,
        duration: Duration,
        reply: Sender<PlaybackOutcome>,
    },
    /// Play one character at the current Farnsworth timing.
    PlayCharacter {
        character: char,
        reply: Sender<PlaybackOutcome>,
    },
    /// Play a group of characters; spaces become word gaps.
    PlayGroup {
        text: String,
        reply: Sender<PlaybackOutcome>,
    },
    /// Terminate the worker. Any active session is ended.
    Shutdown,
}

/// How a playback request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Every segment was played.
    Completed,
    /// A stop request interrupted the sequence.
    Stopped,
    /// The request could not be played at all.
    Failed(String),
}

impl PlaybackOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, PlaybackOutcome::Completed)
    }
}
