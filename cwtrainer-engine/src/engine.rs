use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use cwtrainer_messages::{Command, Event, PlaybackOutcome};
use flume::{Receiver, RecvTimeoutError, Sender};
use log::debug;

use crate::session::AudioCore;
use crate::stop::PlaybackStop;

/// How often the worker checks the backend while idle.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The playback worker.
/// Owns the queue of playback requests and plays them one at a time.
pub struct Engine {
    core: Arc<AudioCore>,
    cmd_rx: Receiver<Command>,
    event_tx: Sender<Event>,
    stop: Arc<PlaybackStop>,
    /// Play requests taken off the queue so far.
    dequeued: u64,
    should_exit: bool,
}

impl Engine {
    /// Create a new Engine instance.
    pub fn new(
        core: Arc<AudioCore>,
        cmd_rx: Receiver<Command>,
        event_tx: Sender<Event>,
        stop: Arc<PlaybackStop>,
    ) -> Self {
        debug!("Constructing a new engine");
        Self {
            core,
            cmd_rx,
            event_tx,
            stop,
            dequeued: 0,
            should_exit: false,
        }
    }

    /// Run the engine (blocking).
    /// Processes commands until `Shutdown` or until every sender is gone,
    /// then ends any active session.
    pub fn run(mut self) -> Result<()> {
        self.publish(Event::StateSnapshot(self.core.snapshot()));

        while !self.should_exit {
            match self.cmd_rx.recv_timeout(POLL_INTERVAL) {
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => {
                    self.core.poll_backend();
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.should_exit = true;
                }
            }
        }

        self.core.end_session();
        debug!("Engine exiting");
        Ok(())
    }

    fn handle(&mut self, command: Command) {
        debug!("Engine received command: {:?}", command);

        if let Command::Shutdown = command {
            self.should_exit = true;
            return;
        }

        self.dequeued += 1;
        let stop = self.stop.begin(self.dequeued);

        let (outcome, reply) = match command {
            Command::PlayTone {
                frequency,
                duration,
                reply,
            } => (self.core.play_tone(frequency, duration, stop), reply),
            Command::PlayCharacter { character, reply } => {
                (self.core.play_character(character, stop), reply)
            }
            Command::PlayGroup { text, reply } => (self.core.play_group(&text, stop), reply),
            Command::Shutdown => return,
        };

        self.finish(outcome, &reply);
    }

    fn finish(&self, outcome: PlaybackOutcome, reply: &Sender<PlaybackOutcome>) {
        debug!("playback finished: {:?}", outcome);
        // The caller may have given up waiting; the event still goes out.
        let _ = reply.send(outcome.clone());
        self.publish(Event::PlaybackFinished(outcome));
    }

    fn publish(&self, event: Event) {
        if self.event_tx.try_send(event).is_err() {
            debug!("event dropped, no listener ready");
        }
    }
}
