use crate::{EngineState, PlaybackOutcome};

/// Events sent from the engine to whoever is listening.
#[derive(Debug, Clone)]
pub enum Event {
    /// Full state snapshot, sent when the worker starts.
    StateSnapshot(EngineState),
    /// A continuous session began rendering.
    SessionStarted,
    /// The continuous session was torn down.
    SessionEnded,
    /// The audio output was taken away; the render graph is stopped.
    Interrupted,
    /// The render graph was rebuilt after an interruption.
    Resumed,
    /// A queued playback request finished.
    PlaybackFinished(PlaybackOutcome),
}
