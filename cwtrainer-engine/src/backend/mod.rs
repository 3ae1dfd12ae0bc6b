//! Audio output backends.
//!
//! A backend owns the render graph while a session is running: `start` attaches
//! a [`RenderPipeline`] to the output, `stop` detaches it and hands it back so
//! the caller can reset and reuse it. The backend is chosen once, when the
//! core is built.

mod null;
#[cfg(feature = "audio-cpal")]
mod real;

pub use null::NullEngine;
#[cfg(feature = "audio-cpal")]
pub use real::RealEngine;

use cwtrainer_messages::AudioConfig;

use crate::error::EngineError;
use crate::render::RenderPipeline;

/// Platform-agnostic audio output.
pub trait AudioEngine: Send {
    fn name(&self) -> &'static str;

    /// Attach `pipeline` and begin rendering continuously.
    fn start(&mut self, pipeline: RenderPipeline) -> Result<(), EngineError>;

    /// Stop rendering and detach the pipeline, if one was attached and can be
    /// recovered.
    fn stop(&mut self) -> Option<RenderPipeline>;

    fn is_running(&self) -> bool;

    /// True once the platform has taken the output away from a running graph.
    fn has_faulted(&self) -> bool {
        false
    }
}

/// Which backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineKind {
    /// Renders on a plain thread and discards the samples.
    #[default]
    Null,
    /// Renders to the default output device.
    Real,
}

/// Build the requested backend, falling back to [`NullEngine`] when real
/// output is unavailable.
pub fn create_engine(kind: EngineKind, config: AudioConfig) -> Box<dyn AudioEngine> {
    match kind {
        EngineKind::Null => Box::new(NullEngine::new(config)),
        EngineKind::Real => {
            #[cfg(feature = "audio-cpal")]
            {
                match RealEngine::new(config) {
                    Ok(engine) => return Box::new(engine),
                    Err(e) => log::warn!("cpal init failed: {e}, using null output"),
                }
            }
            #[cfg(not(feature = "audio-cpal"))]
            log::warn!("built without audio-cpal, using null output");
            Box::new(NullEngine::new(config))
        }
    }
}
