//! The audio core: session lifecycle, radio control and tone playback.
//!
//! `AudioCore` is shared between the caller and the playback worker. Radio
//! state and tone parameters are the only things the render thread touches;
//! graph bookkeeping sits behind its own lock that only control threads take.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use cwtrainer_messages::{
    AudioConfig, BandConditionsConfig, EngineState, Event, Hertz, PlaybackOutcome, RadioMode,
    RadioState, Wpm,
};
use flume::Sender;
use log::{debug, info, warn};

use crate::backend::AudioEngine;
use crate::band::BandConditionsProcessor;
use crate::error::{EngineError, RadioError};
use crate::radio::RadioStateMachine;
use crate::render::{RenderPipeline, SharedTone, ToneParameters};
use crate::sequencer::{PlaybackSequencer, Segment, ToneGate};
use crate::timing::{MAX_EFFECTIVE_SPEED, clamp_effective_speed};

pub const MIN_FREQUENCY: Hertz = Hertz(400.0);
pub const MAX_FREQUENCY: Hertz = Hertz(800.0);
pub const DEFAULT_FREQUENCY: Hertz = Hertz(600.0);

/// Clamp a tone frequency into the supported sidetone range. A non-finite
/// frequency falls back to the default.
pub fn clamp_frequency(frequency: Hertz) -> Hertz {
    if !frequency.0.is_finite() {
        return DEFAULT_FREQUENCY;
    }
    frequency.clamp(MIN_FREQUENCY, MAX_FREQUENCY)
}

#[derive(Debug, Clone, Copy)]
struct Settings {
    band: BandConditionsConfig,
    effective_speed: Wpm,
}

/// The backend plus what is attached to it.
struct GraphSlot {
    engine: Box<dyn AudioEngine>,
    /// Session pipeline kept between sessions, already reset.
    parked: Option<RenderPipeline>,
    active: bool,
    interrupted: bool,
    /// The current interruption came from a backend fault, not the platform.
    fault_recovery: bool,
}

pub struct AudioCore {
    audio: AudioConfig,
    radio: Arc<RadioStateMachine>,
    tone: SharedTone,
    settings: Mutex<Settings>,
    graph: Mutex<GraphSlot>,
    session_active: AtomicBool,
    events: Option<Sender<Event>>,
}

impl AudioCore {
    pub fn new(audio: AudioConfig, engine: Box<dyn AudioEngine>) -> Self {
        debug!("Constructing audio core on {} output", engine.name());
        Self {
            audio,
            radio: Arc::new(RadioStateMachine::new()),
            tone: Arc::new(Mutex::new(ToneParameters::new(DEFAULT_FREQUENCY.0))),
            settings: Mutex::new(Settings {
                band: BandConditionsConfig::default(),
                effective_speed: MAX_EFFECTIVE_SPEED,
            }),
            graph: Mutex::new(GraphSlot {
                engine,
                parked: None,
                active: false,
                interrupted: false,
                fault_recovery: false,
            }),
            session_active: AtomicBool::new(false),
            events: None,
        }
    }

    /// Publish lifecycle events on `events`.
    pub fn with_events(mut self, events: Sender<Event>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn audio_config(&self) -> AudioConfig {
        self.audio
    }

    pub fn radio(&self) -> &RadioStateMachine {
        &self.radio
    }

    pub fn radio_state(&self) -> RadioState {
        self.radio.snapshot()
    }

    pub fn is_session_active(&self) -> bool {
        self.session_active.load(Ordering::Acquire)
    }

    /// True while a session exists but its graph is down after an interruption.
    pub fn is_interrupted(&self) -> bool {
        self.slot().interrupted
    }

    /// Build and attach a fresh render graph and start receiving.
    ///
    /// A no-op while a session is already active. On failure the core is left
    /// inactive with the radio off.
    pub fn start_session(&self) -> Result<(), EngineError> {
        let mut slot = self.slot();
        if slot.active {
            debug!("session already active");
            return Ok(());
        }

        let pipeline = self.prepare_pipeline(&mut slot);
        self.reset_phase();
        self.radio.restore(RadioMode::Receiving);

        if let Err(e) = slot.engine.start(pipeline) {
            warn!("failed to start {} output: {}", slot.engine.name(), e);
            self.radio.force_off();
            self.reset_phase();
            return Err(e);
        }

        slot.active = true;
        slot.interrupted = false;
        slot.fault_recovery = false;
        self.session_active.store(true, Ordering::Release);
        info!("session started on {} output", slot.engine.name());
        self.emit(Event::SessionStarted);
        Ok(())
    }

    /// Detach the render graph and turn the radio off. A no-op when no
    /// session is active.
    pub fn end_session(&self) {
        let mut slot = self.slot();
        if !slot.active {
            debug!("no session to end");
            return;
        }

        Self::park(&mut slot);
        self.radio.force_off();
        self.reset_phase();

        slot.active = false;
        slot.interrupted = false;
        slot.fault_recovery = false;
        self.session_active.store(false, Ordering::Release);
        info!("session ended");
        self.emit(Event::SessionEnded);
    }

    /// The platform took the output away: stop the graph, keep the mode.
    pub fn interruption_began(&self) {
        self.begin_interruption(false);
    }

    fn begin_interruption(&self, from_fault: bool) {
        let mut slot = self.slot();
        if !slot.active || slot.interrupted {
            return;
        }

        Self::park(&mut slot);
        slot.interrupted = true;
        slot.fault_recovery = from_fault;
        warn!(
            "audio output interrupted, render graph stopped (mode {})",
            self.radio.mode()
        );
        self.emit(Event::Interrupted);
    }

    /// Rebuild the graph with clean DSP state and restore the last mode.
    ///
    /// If the output cannot be restarted the session is ended.
    pub fn interruption_ended(&self) -> Result<(), EngineError> {
        let mut slot = self.slot();
        if !slot.active || !slot.interrupted {
            return Ok(());
        }

        let mode = self.radio.mode();
        let pipeline = self.prepare_pipeline(&mut slot);
        self.reset_phase();
        self.radio.restore(mode);

        if let Err(e) = slot.engine.start(pipeline) {
            warn!("failed to resume {} output: {}", slot.engine.name(), e);
            self.radio.force_off();
            self.reset_phase();
            slot.active = false;
            slot.interrupted = false;
            slot.fault_recovery = false;
            self.session_active.store(false, Ordering::Release);
            self.emit(Event::SessionEnded);
            return Err(e);
        }

        slot.interrupted = false;
        slot.fault_recovery = false;
        info!("audio output resumed in {} mode", mode);
        self.emit(Event::Resumed);
        Ok(())
    }

    /// Check the backend for a fault and treat one as an interruption.
    /// An interruption caused by a fault is resumed on the next poll; one
    /// raised by the platform waits for [`AudioCore::interruption_ended`].
    ///
    /// Returns true if a new fault was detected.
    pub fn poll_backend(&self) -> bool {
        let (faulted, recovering) = {
            let slot = self.slot();
            (slot.engine.has_faulted(), slot.interrupted && slot.fault_recovery)
        };

        if recovering {
            info!("restarting output after backend fault");
            if let Err(e) = self.interruption_ended() {
                warn!("could not recover from backend fault: {}", e);
            }
            return false;
        }

        if faulted {
            self.begin_interruption(true);
        }
        faulted
    }

    pub fn start_receiving(&self) -> Result<(), RadioError> {
        self.radio.start_receiving()
    }

    pub fn start_transmitting(&self) -> Result<(), RadioError> {
        self.radio.start_transmitting()
    }

    pub fn stop(&self) -> Result<(), RadioError> {
        self.radio.stop()
    }

    pub fn key(&self) -> Result<(), RadioError> {
        self.radio.key()
    }

    pub fn unkey(&self) -> Result<(), RadioError> {
        self.radio.unkey()
    }

    /// Tune to `frequency` and open the tone gate. Fails with
    /// [`RadioError::MustBeOn`] while the radio is off, leaving the frequency
    /// untouched.
    pub fn activate_tone(&self, frequency: Hertz) -> Result<(), RadioError> {
        if self.radio.mode() == RadioMode::Off {
            return Err(RadioError::MustBeOn);
        }
        self.set_frequency(frequency);
        self.radio.activate_tone()
    }

    pub fn deactivate_tone(&self) -> Result<(), RadioError> {
        self.radio.deactivate_tone()
    }

    /// Set the tone frequency, clamped to 400..=800 Hz. Returns the value used.
    pub fn set_frequency(&self, frequency: Hertz) -> Hertz {
        let frequency = clamp_frequency(frequency);
        self.lock_tone().frequency_hz = frequency.0;
        frequency
    }

    pub fn frequency(&self) -> Hertz {
        Hertz(self.lock_tone().frequency_hz)
    }

    /// Set the Farnsworth effective speed, clamped to 10..=18 WPM.
    pub fn set_effective_speed(&self, wpm: Wpm) -> Wpm {
        let wpm = clamp_effective_speed(wpm);
        self.lock_settings().effective_speed = wpm;
        wpm
    }

    pub fn effective_speed(&self) -> Wpm {
        self.lock_settings().effective_speed
    }

    /// Store band conditions for the next session start.
    pub fn configure_band_conditions(&self, config: BandConditionsConfig) {
        let config = config.normalized();
        self.lock_settings().band = config;
        if self.is_session_active() {
            debug!("band conditions stored, applied at next session start");
        } else {
            debug!("band conditions configured: {:?}", config);
        }
    }

    pub fn band_conditions(&self) -> BandConditionsConfig {
        self.lock_settings().band
    }

    pub fn sequencer(&self) -> PlaybackSequencer {
        PlaybackSequencer::new(self.effective_speed())
    }

    /// Play one tone. Without a session the tone gets its own short-lived
    /// render graph; inside a session it is gated on the running one.
    pub fn play_tone(&self, frequency: Hertz, duration: Duration, stop: &AtomicBool) -> PlaybackOutcome {
        let frequency = clamp_frequency(frequency);
        self.play_segments(&[Segment::Tone(duration)], Some(frequency), stop)
    }

    pub fn play_character(&self, character: char, stop: &AtomicBool) -> PlaybackOutcome {
        match self.sequencer().character_segments(character) {
            Some(segments) => self.play_segments(&segments, None, stop),
            None => {
                warn!("no Morse code for {:?}", character);
                PlaybackOutcome::Failed(format!("no Morse code for {:?}", character))
            }
        }
    }

    pub fn play_group(&self, text: &str, stop: &AtomicBool) -> PlaybackOutcome {
        let segments = self.sequencer().group_segments(text);
        self.play_segments(&segments, None, stop)
    }

    pub fn snapshot(&self) -> EngineState {
        let settings = *self.lock_settings();
        EngineState {
            radio: self.radio.snapshot(),
            session_active: self.is_session_active(),
            frequency: self.frequency(),
            effective_speed: settings.effective_speed,
            band_conditions: settings.band,
            audio: self.audio,
        }
    }

    fn play_segments(
        &self,
        segments: &[Segment],
        frequency: Option<Hertz>,
        stop: &AtomicBool,
    ) -> PlaybackOutcome {
        let sequencer = self.sequencer();
        let slot = self.slot();

        let result = if slot.active {
            drop(slot);
            if let Some(frequency) = frequency {
                self.set_frequency(frequency);
            }
            let mut gate = SessionGate { radio: &self.radio };
            sequencer
                .play(segments, &mut gate, stop)
                .map_err(|e| e.to_string())
        } else {
            let mut gate = DiscreteGate {
                slot,
                audio: self.audio,
                frequency: frequency.unwrap_or_else(|| self.frequency()),
            };
            let result = sequencer.play(segments, &mut gate, stop);
            // A failed or stopped sequence must not leave the private graph up.
            gate.teardown();
            result.map_err(|e| e.to_string())
        };

        result.unwrap_or_else(|e| {
            warn!("playback failed: {}", e);
            PlaybackOutcome::Failed(e)
        })
    }

    fn prepare_pipeline(&self, slot: &mut GraphSlot) -> RenderPipeline {
        let band = self.band_conditions();
        match slot.parked.take() {
            Some(mut pipeline) => {
                pipeline.prepare(band);
                pipeline
            }
            None => RenderPipeline::new(
                self.radio.clone(),
                self.tone.clone(),
                BandConditionsProcessor::new(band, self.audio.sample_rate, self.audio.seed),
                self.audio.sample_rate,
            ),
        }
    }

    /// Detach the running graph, if any, and keep it reset for the next start.
    fn park(slot: &mut GraphSlot) {
        if let Some(mut pipeline) = slot.engine.stop() {
            pipeline.reset();
            slot.parked = Some(pipeline);
        }
    }

    fn reset_phase(&self) {
        self.lock_tone().phase_radians = 0.0;
    }

    fn emit(&self, event: Event) {
        if let Some(events) = &self.events {
            if events.try_send(event).is_err() {
                debug!("event dropped, no listener ready");
            }
        }
    }

    fn slot(&self) -> MutexGuard<'_, GraphSlot> {
        self.graph.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_settings(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_tone(&self) -> MutexGuard<'_, ToneParameters> {
        self.tone.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Toggles the playback gate of the running session.
struct SessionGate<'a> {
    radio: &'a RadioStateMachine,
}

impl ToneGate for SessionGate<'_> {
    type Error = RadioError;

    fn tone_on(&mut self) -> Result<(), RadioError> {
        self.radio.activate_tone()
    }

    fn tone_off(&mut self) -> Result<(), RadioError> {
        self.radio.deactivate_tone()
    }
}

/// Starts and tears down a private render graph for every tone.
///
/// Holds the graph lock for the whole sequence so a session cannot be
/// started underneath it.
struct DiscreteGate<'a> {
    slot: MutexGuard<'a, GraphSlot>,
    audio: AudioConfig,
    frequency: Hertz,
}

impl DiscreteGate<'_> {
    fn teardown(&mut self) {
        if let Some(mut pipeline) = self.slot.engine.stop() {
            pipeline.reset();
        }
    }
}

impl ToneGate for DiscreteGate<'_> {
    type Error = EngineError;

    fn tone_on(&mut self) -> Result<(), EngineError> {
        let radio = RadioStateMachine::with_state(RadioState {
            mode: RadioMode::Transmitting,
            is_keying: true,
            tone_active: false,
        });
        let tone = Arc::new(Mutex::new(ToneParameters::new(self.frequency.0)));
        // Previews are never run through band conditions.
        let band = BandConditionsProcessor::new(
            BandConditionsConfig::default(),
            self.audio.sample_rate,
            self.audio.seed,
        );
        let pipeline = RenderPipeline::new(Arc::new(radio), tone, band, self.audio.sample_rate);
        self.slot.engine.start(pipeline)
    }

    fn tone_off(&mut self) -> Result<(), EngineError> {
        self.teardown();
        Ok(())
    }
}
