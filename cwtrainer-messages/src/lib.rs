//! Shared vocabulary between the CW trainer engine and its callers.
//!
//! Nothing in here owns a thread or a lock; these are the plain values that
//! cross the command/event channels and the radio state snapshot.

mod command;
mod event;
mod state;
mod units;

pub use command::{Command, PlaybackOutcome};
pub use event::Event;
pub use state::{AudioConfig, BandConditionsConfig, EngineState, RadioMode, RadioState};
pub use units::{Hertz, Wpm};
