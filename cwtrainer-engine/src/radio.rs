//! Half-duplex radio state machine.
//!
//! Every transition runs inside one short critical section, so the render
//! thread only ever copies a complete [`RadioState`]. A failed transition
//! leaves the state untouched.

use std::sync::{Mutex, MutexGuard};

use cwtrainer_messages::{RadioMode, RadioState};
use log::debug;

use crate::error::RadioError;

#[derive(Debug, Default)]
pub struct RadioStateMachine {
    state: Mutex<RadioState>,
}

impl RadioStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// A machine already in `state`, for private render graphs.
    pub(crate) fn with_state(state: RadioState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Copy of the current state.
    ///
    /// Returns `None` only if a writer panicked while holding the lock.
    pub fn try_snapshot(&self) -> Option<RadioState> {
        self.state.lock().ok().map(|state| *state)
    }

    /// Copy of the current state, recovering from a poisoned lock.
    pub fn snapshot(&self) -> RadioState {
        *self.lock()
    }

    pub fn mode(&self) -> RadioMode {
        self.lock().mode
    }

    pub fn is_keying(&self) -> bool {
        self.lock().is_keying
    }

    pub fn start_receiving(&self) -> Result<(), RadioError> {
        self.transition("start_receiving", |state| {
            if state.mode != RadioMode::Off {
                return Err(RadioError::MustBeOff(state.mode));
            }
            state.mode = RadioMode::Receiving;
            Ok(())
        })
    }

    pub fn start_transmitting(&self) -> Result<(), RadioError> {
        self.transition("start_transmitting", |state| {
            if state.mode != RadioMode::Off {
                return Err(RadioError::MustBeOff(state.mode));
            }
            state.mode = RadioMode::Transmitting;
            Ok(())
        })
    }

    /// Return to `Off`. Both tone gates are cleared in the same critical
    /// section so no tone can outlive the mode change.
    pub fn stop(&self) -> Result<(), RadioError> {
        self.transition("stop", |state| {
            if state.mode == RadioMode::Off {
                return Err(RadioError::AlreadyOff);
            }
            state.is_keying = false;
            state.tone_active = false;
            state.mode = RadioMode::Off;
            Ok(())
        })
    }

    pub fn key(&self) -> Result<(), RadioError> {
        self.transition("key", |state| {
            if state.mode != RadioMode::Transmitting {
                return Err(RadioError::MustBeTransmitting(state.mode));
            }
            state.is_keying = true;
            Ok(())
        })
    }

    pub fn unkey(&self) -> Result<(), RadioError> {
        self.transition("unkey", |state| {
            if state.mode != RadioMode::Transmitting {
                return Err(RadioError::MustBeTransmitting(state.mode));
            }
            state.is_keying = false;
            Ok(())
        })
    }

    /// Open the playback tone gate. Valid in any mode except `Off`.
    pub fn activate_tone(&self) -> Result<(), RadioError> {
        self.transition("activate_tone", |state| {
            if state.mode == RadioMode::Off {
                return Err(RadioError::MustBeOn);
            }
            state.tone_active = true;
            Ok(())
        })
    }

    pub fn deactivate_tone(&self) -> Result<(), RadioError> {
        self.transition("deactivate_tone", |state| {
            if state.mode == RadioMode::Off {
                return Err(RadioError::MustBeOn);
            }
            state.tone_active = false;
            Ok(())
        })
    }

    /// Unconditionally return to `Off` with both gates cleared.
    /// Returns the mode that was active before.
    pub fn force_off(&self) -> RadioMode {
        let mut state = self.lock();
        let previous = state.mode;
        *state = RadioState::default();
        debug!("radio forced off (was {})", previous);
        previous
    }

    /// Put the radio back into `mode` with both gates cleared.
    pub fn restore(&self, mode: RadioMode) {
        let mut state = self.lock();
        *state = RadioState {
            mode,
            ..RadioState::default()
        };
        debug!("radio restored to {}", mode);
    }

    fn transition<F>(&self, name: &str, apply: F) -> Result<(), RadioError>
    where
        F: FnOnce(&mut RadioState) -> Result<(), RadioError>,
    {
        let mut state = self.lock();
        // Work on a copy so a rejected transition never leaves a partial write.
        let mut next = *state;
        apply(&mut next)?;
        *state = next;
        debug!("radio {}: {:?}", name, next);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, RadioState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
