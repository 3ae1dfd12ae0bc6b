//! # cwtrainer-engine
//!
//! Audio core of a half-duplex CW transceiver simulator.
//!
//! - [`RadioStateMachine`]: receive/transmit mode and keying, behind one lock.
//! - [`BandConditionsProcessor`]: per-sample fading, noise and interference.
//! - [`RenderPipeline`]: the render graph driven by the audio callback.
//! - [`PlaybackSequencer`]: Farnsworth-timed Morse playback.
//! - [`AudioCore`] ties them to an [`AudioEngine`] backend, and [`Trainer`]
//!   serializes playback through the [`Engine`] worker.

pub mod backend;
pub mod band;
mod engine;
pub mod error;
pub mod morse;
pub mod radio;
pub mod render;
pub mod sequencer;
mod session;
mod stop;
pub mod timing;
mod trainer;

pub use backend::{AudioEngine, EngineKind, NullEngine, create_engine};
pub use band::BandConditionsProcessor;
pub use engine::Engine;
pub use error::{EngineError, RadioError};
pub use radio::RadioStateMachine;
pub use render::{RenderPipeline, ToneParameters};
pub use sequencer::{PlaybackSequencer, Segment};
pub use session::{AudioCore, DEFAULT_FREQUENCY, MAX_FREQUENCY, MIN_FREQUENCY, clamp_frequency};
pub use stop::PlaybackStop;
pub use timing::FarnsworthTiming;
pub use trainer::Trainer;
