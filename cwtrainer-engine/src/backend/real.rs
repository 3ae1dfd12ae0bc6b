use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, Stream, StreamConfig};
use cwtrainer_messages::AudioConfig;
use flume::Sender;
use log::{debug, info, warn};

use super::AudioEngine;
use crate::error::EngineError;
use crate::render::RenderPipeline;

struct StreamThread {
    stop_tx: Sender<()>,
    handle: JoinHandle<Option<RenderPipeline>>,
}

/// Backend rendering to the default output device through cpal.
///
/// A cpal stream cannot leave the thread that built it, so each session gets
/// an owner thread that builds the stream, parks until told to stop, and then
/// drops the stream and returns the pipeline.
pub struct RealEngine {
    config: AudioConfig,
    fault: Arc<AtomicBool>,
    worker: Option<StreamThread>,
}

impl RealEngine {
    pub fn new(config: AudioConfig) -> Result<Self, EngineError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(EngineError::NoOutputDevice)?;
        info!(
            "audio output: {}",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );
        Ok(Self {
            config,
            fault: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }
}

/// Stream configurations to try, in order: the requested fixed buffer size,
/// then whatever the device prefers.
fn stream_configs(config: &AudioConfig) -> [StreamConfig; 2] {
    let with = |buffer_size| StreamConfig {
        channels: 1,
        sample_rate: SampleRate(config.sample_rate),
        buffer_size,
    };
    [
        with(BufferSize::Fixed(config.buffer_size as u32)),
        with(BufferSize::Default),
    ]
}

fn build_stream(
    config: &AudioConfig,
    pipeline: Arc<Mutex<RenderPipeline>>,
    fault: Arc<AtomicBool>,
) -> Result<Stream, EngineError> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or(EngineError::NoOutputDevice)?;

    let mut last_error = None;
    for stream_config in stream_configs(config) {
        match open_stream(&device, &stream_config, pipeline.clone(), fault.clone()) {
            Ok(stream) => {
                stream
                    .play()
                    .map_err(|e| EngineError::StreamPlay(e.to_string()))?;
                return Ok(stream);
            }
            Err(e) => {
                warn!("output rejected {:?}: {}", stream_config.buffer_size, e);
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or(EngineError::NoOutputDevice))
}

fn open_stream(
    device: &cpal::Device,
    stream_config: &StreamConfig,
    pipeline: Arc<Mutex<RenderPipeline>>,
    fault: Arc<AtomicBool>,
) -> Result<Stream, EngineError> {
    device
        .build_output_stream(
            stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                // Never wait on the control thread from the audio callback.
                match pipeline.try_lock() {
                    Ok(mut pipeline) => pipeline.render(data),
                    Err(_) => data.fill(0.0),
                }
            },
            move |err| {
                warn!("audio stream error: {}", err);
                fault.store(true, Ordering::Release);
            },
            None,
        )
        .map_err(|e| EngineError::StreamBuild(e.to_string()))
}

impl AudioEngine for RealEngine {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn start(&mut self, pipeline: RenderPipeline) -> Result<(), EngineError> {
        if self.worker.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        self.fault.store(false, Ordering::Release);

        let (ready_tx, ready_rx) = flume::bounded(1);
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let config = self.config;
        let fault = self.fault.clone();

        let handle = thread::spawn(move || {
            let shared = Arc::new(Mutex::new(pipeline));
            let stream = match build_stream(&config, shared.clone(), fault) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return None;
                }
            };
            let _ = ready_tx.send(Ok(()));

            // Either an explicit stop or the engine being dropped ends the stream.
            let _ = stop_rx.recv();
            drop(stream);

            Arc::try_unwrap(shared)
                .ok()
                .map(|pipeline| pipeline.into_inner().unwrap_or_else(|p| p.into_inner()))
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                debug!("cpal stream running");
                self.worker = Some(StreamThread { stop_tx, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(EngineError::StreamBuild("stream thread exited".to_string()))
            }
        }
    }

    fn stop(&mut self) -> Option<RenderPipeline> {
        let worker = self.worker.take()?;
        let _ = worker.stop_tx.send(());
        match worker.handle.join() {
            Ok(pipeline) => {
                debug!("cpal stream stopped");
                pipeline
            }
            Err(_) => {
                warn!("cpal stream thread panicked");
                None
            }
        }
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    fn has_faulted(&self) -> bool {
        self.worker.is_some() && self.fault.load(Ordering::Acquire)
    }
}

impl Drop for RealEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
