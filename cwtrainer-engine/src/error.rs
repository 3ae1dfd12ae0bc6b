use cwtrainer_messages::RadioMode;
use thiserror::Error;

/// Caller logic errors raised by the radio state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RadioError {
    #[error("radio must be off, but is {0}")]
    MustBeOff(RadioMode),

    #[error("radio must be transmitting, but is {0}")]
    MustBeTransmitting(RadioMode),

    #[error("radio is already off")]
    AlreadyOff,

    #[error("radio must be on to sound a tone")]
    MustBeOn,
}

/// Failures of the audio backend or the playback worker.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no audio output device available")]
    NoOutputDevice,

    #[error("failed to build output stream: {0}")]
    StreamBuild(String),

    #[error("failed to start output stream: {0}")]
    StreamPlay(String),

    #[error("render graph is already running")]
    AlreadyRunning,

    #[error("playback worker is not running")]
    WorkerGone,
}
