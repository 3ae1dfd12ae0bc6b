//! Caller-facing handle.
//!
//! Radio and session operations run synchronously on the shared
//! [`AudioCore`]. Playback requests go through the worker queue, so
//! overlapping requests play one after another and each caller blocks until
//! its own request has finished.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cwtrainer_messages::{Command, Event, Hertz, PlaybackOutcome};
use flume::Sender;
use log::{debug, warn};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::session::AudioCore;
use crate::stop::PlaybackStop;

pub struct Trainer {
    core: Arc<AudioCore>,
    cmd_tx: Sender<Command>,
    stop: Arc<PlaybackStop>,
    worker: Option<JoinHandle<anyhow::Result<()>>>,
}

impl Trainer {
    /// Spawn the playback worker for `core`. Worker events go to `event_tx`.
    pub fn spawn(core: AudioCore, event_tx: Sender<Event>) -> Self {
        let core = Arc::new(core);
        let stop = Arc::new(PlaybackStop::new());
        let (cmd_tx, cmd_rx) = flume::unbounded();

        let engine = Engine::new(core.clone(), cmd_rx, event_tx, stop.clone());
        let worker = thread::spawn(move || engine.run());

        Self {
            core,
            cmd_tx,
            stop,
            worker: Some(worker),
        }
    }

    pub fn core(&self) -> &AudioCore {
        &self.core
    }

    /// Queue a tone and wait for it to finish.
    pub fn play_tone(&self, frequency: Hertz, duration: Duration) -> Result<PlaybackOutcome, EngineError> {
        self.request(|reply| Command::PlayTone {
            frequency,
            duration,
            reply,
        })
    }

    /// Queue one character and wait for it to finish.
    pub fn play_character(&self, character: char) -> Result<PlaybackOutcome, EngineError> {
        self.request(|reply| Command::PlayCharacter { character, reply })
    }

    /// Queue a group of characters and wait for it to finish.
    pub fn play_group(&self, text: &str) -> Result<PlaybackOutcome, EngineError> {
        let text = text.to_string();
        self.request(|reply| Command::PlayGroup { text, reply })
    }

    /// Halt the sequence that is playing now along with every request queued
    /// before this call. Takes effect before the next segment at the latest.
    pub fn stop_playback(&self) {
        debug!("stop requested");
        self.stop.stop();
    }

    /// Stop the worker and end any active session.
    pub fn shutdown(mut self) -> anyhow::Result<()> {
        self.join_worker()
    }

    fn request<F>(&self, build: F) -> Result<PlaybackOutcome, EngineError>
    where
        F: FnOnce(Sender<PlaybackOutcome>) -> Command,
    {
        let (reply_tx, reply_rx) = flume::bounded(1);
        self.stop
            .enqueue(|| self.cmd_tx.send(build(reply_tx)))
            .map_err(|_| EngineError::WorkerGone)?;
        reply_rx.recv().map_err(|_| EngineError::WorkerGone)
    }

    fn join_worker(&mut self) -> anyhow::Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.stop_playback();
        let _ = self.cmd_tx.send(Command::Shutdown);
        worker
            .join()
            .map_err(|_| anyhow::anyhow!("Engine thread panicked"))?
    }
}

impl Drop for Trainer {
    fn drop(&mut self) {
        if let Err(e) = self.join_worker() {
            warn!("playback worker did not shut down cleanly: {}", e);
        }
    }
}
