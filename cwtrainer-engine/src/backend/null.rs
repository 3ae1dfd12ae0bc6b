use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cwtrainer_messages::AudioConfig;
use flume::{SendTimeoutError, Sender};
use log::{debug, warn};

use super::AudioEngine;
use crate::error::EngineError;
use crate::render::RenderPipeline;

const TAP_TIMEOUT: Duration = Duration::from_millis(10);

struct RenderThread {
    running: Arc<AtomicBool>,
    handle: JoinHandle<RenderPipeline>,
}

/// Backend without an output device.
///
/// Buffers are rendered on a dedicated thread, optionally paced at the real
/// buffer period, and optionally copied to a tap channel for inspection.
pub struct NullEngine {
    config: AudioConfig,
    paced: bool,
    tap: Option<Sender<Vec<f32>>>,
    worker: Option<RenderThread>,
}

impl NullEngine {
    pub fn new(config: AudioConfig) -> Self {
        Self {
            config,
            paced: true,
            tap: None,
            worker: None,
        }
    }

    /// Send a copy of rendered buffers to `tap`, for tests and offline
    /// inspection. Each delivered buffer is a fresh allocation; buffers are
    /// only copied while a bounded tap has room, so an idle consumer costs
    /// nothing beyond the render itself.
    pub fn with_tap(mut self, tap: Sender<Vec<f32>>) -> Self {
        self.tap = Some(tap);
        self
    }

    /// Render as fast as the tap accepts buffers instead of in real time.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    fn buffer_period(&self) -> Duration {
        let rate = self.config.sample_rate.max(1) as f64;
        Duration::from_secs_f64(self.config.buffer_size as f64 / rate)
    }
}

impl AudioEngine for NullEngine {
    fn name(&self) -> &'static str {
        "null"
    }

    fn start(&mut self, mut pipeline: RenderPipeline) -> Result<(), EngineError> {
        if self.worker.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let mut tap = self.tap.clone();
        let period = self.paced.then(|| self.buffer_period());
        let buffer_size = self.config.buffer_size.max(1);

        let handle = thread::spawn(move || {
            let mut buffer = vec![0.0f32; buffer_size];
            while flag.load(Ordering::Acquire) {
                pipeline.render(&mut buffer);

                if let Some(sender) = tap.as_ref().filter(|sender| !sender.is_full()) {
                    match sender.send_timeout(buffer.clone(), TAP_TIMEOUT) {
                        Ok(()) | Err(SendTimeoutError::Timeout(_)) => {}
                        Err(SendTimeoutError::Disconnected(_)) => tap = None,
                    }
                }

                match period {
                    Some(period) => thread::sleep(period),
                    None if tap.as_ref().is_none_or(|sender| sender.is_full()) => {
                        thread::yield_now()
                    }
                    None => {}
                }
            }
            pipeline
        });

        debug!("null engine started ({} samples/buffer)", buffer_size);
        self.worker = Some(RenderThread { running, handle });
        Ok(())
    }

    fn stop(&mut self) -> Option<RenderPipeline> {
        let worker = self.worker.take()?;
        worker.running.store(false, Ordering::Release);
        match worker.handle.join() {
            Ok(pipeline) => {
                debug!("null engine stopped");
                Some(pipeline)
            }
            Err(_) => {
                warn!("null render thread panicked");
                None
            }
        }
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for NullEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
