//! Tone render pipeline.
//!
//! One [`RenderPipeline`] is the render graph of a session: it is built by the
//! control thread, handed to an audio backend, and driven from the real-time
//! callback one buffer at a time. Shared state is read under brief locks once
//! per buffer; the per-sample loop runs on local copies only.

use std::f32::consts::TAU;
use std::sync::{Arc, Mutex};

use cwtrainer_messages::{BandConditionsConfig, RadioMode};

use crate::band::BandConditionsProcessor;
use crate::radio::RadioStateMachine;

/// Peak amplitude of the generated tone before band conditions.
pub const TONE_AMPLITUDE: f32 = 0.5;

/// Tone frequency and running oscillator phase, shared with the render thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneParameters {
    pub frequency_hz: f32,
    pub phase_radians: f32,
}

impl ToneParameters {
    pub fn new(frequency_hz: f32) -> Self {
        Self {
            frequency_hz,
            phase_radians: 0.0,
        }
    }
}

pub type SharedTone = Arc<Mutex<ToneParameters>>;

pub struct RenderPipeline {
    radio: Arc<RadioStateMachine>,
    tone: SharedTone,
    band: BandConditionsProcessor,
    sample_rate: f32,
}

impl RenderPipeline {
    pub fn new(
        radio: Arc<RadioStateMachine>,
        tone: SharedTone,
        band: BandConditionsProcessor,
        sample_rate: u32,
    ) -> Self {
        Self {
            radio,
            tone,
            band,
            sample_rate: sample_rate.max(1) as f32,
        }
    }

    pub fn band(&self) -> &BandConditionsProcessor {
        &self.band
    }

    /// Swap band conditions and clear the DSP state, ready for a new session.
    pub fn prepare(&mut self, config: BandConditionsConfig) {
        self.band.set_config(config);
        self.band.reset();
    }

    /// Clear the DSP filter state.
    pub fn reset(&mut self) {
        self.band.reset();
    }

    /// Fill `out` with the next buffer of samples.
    ///
    /// Receiving runs the tone through band conditions; transmitting is the
    /// clean sidetone. Any unreadable or inconsistent shared state renders
    /// the whole buffer as silence.
    pub fn render(&mut self, out: &mut [f32]) {
        let Some(state) = self.radio.try_snapshot() else {
            out.fill(0.0);
            return;
        };
        let Some(tone) = self.tone.lock().ok().map(|tone| *tone) else {
            out.fill(0.0);
            return;
        };
        if !state.is_consistent() {
            out.fill(0.0);
            return;
        }

        if !tone.frequency_hz.is_finite() {
            out.fill(0.0);
            return;
        }

        let increment = TAU * tone.frequency_hz / self.sample_rate;
        let mut phase = if tone.phase_radians.is_finite() {
            tone.phase_radians
        } else {
            0.0
        };
        self.band.set_carrier(tone.frequency_hz);

        for sample in out.iter_mut() {
            let value = match state.mode {
                RadioMode::Off => 0.0,
                RadioMode::Receiving => {
                    let raw = if state.tone_active {
                        phase.sin() * TONE_AMPLITUDE
                    } else {
                        0.0
                    };
                    self.band.process_sample(raw)
                }
                RadioMode::Transmitting => {
                    if state.is_keying || state.tone_active {
                        phase.sin() * TONE_AMPLITUDE
                    } else {
                        0.0
                    }
                }
            };

            phase += increment;
            if phase >= TAU {
                phase -= TAU;
            }
            *sample = value.clamp(-1.0, 1.0);
        }

        if let Ok(mut shared) = self.tone.lock() {
            shared.phase_radians = phase;
        }
    }
}
