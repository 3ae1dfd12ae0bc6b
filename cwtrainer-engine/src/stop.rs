//! Stop requests for queued playback.
//!
//! Requests are numbered in the order they enter the queue. A stop covers
//! every request queued so far, including ones the worker has not picked up
//! yet; requests queued after the stop play normally.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct PlaybackStop {
    /// Flag polled by the sequencer for the request playing now.
    raised: AtomicBool,
    /// Highest request number covered by a stop.
    stop_through: AtomicU64,
    /// Requests queued so far. Held while sending so numbers follow queue order.
    queued: Mutex<u64>,
}

impl PlaybackStop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one request through `send`. The request is only counted if
    /// `send` succeeds.
    pub fn enqueue<E>(&self, send: impl FnOnce() -> Result<(), E>) -> Result<(), E> {
        let mut queued = self.lock_queued();
        send()?;
        *queued += 1;
        Ok(())
    }

    /// Stop the playing request and every request queued before this call.
    pub fn stop(&self) {
        let queued = *self.lock_queued();
        self.stop_through.fetch_max(queued, Ordering::SeqCst);
        self.raised.store(true, Ordering::SeqCst);
    }

    /// Arm the flag for request number `request` (1-based, queue order) and
    /// return it for the sequencer to poll.
    pub fn begin(&self, request: u64) -> &AtomicBool {
        // Lower first, then check: a concurrent stop can only raise it again.
        self.raised.store(false, Ordering::SeqCst);
        if self.stop_through.load(Ordering::SeqCst) >= request {
            self.raised.store(true, Ordering::SeqCst);
        }
        &self.raised
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    fn lock_queued(&self) -> MutexGuard<'_, u64> {
        self.queued.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
