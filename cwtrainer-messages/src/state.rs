use crate::{Hertz, Wpm};

/// Half-duplex radio mode. Exactly one is active at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RadioMode {
    #[default]
    Off,
    Receiving,
    Transmitting,
}

impl std::fmt::Display for RadioMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RadioMode::Off => "off",
            RadioMode::Receiving => "receiving",
            RadioMode::Transmitting => "transmitting",
        };
        f.write_str(name)
    }
}

/// Radio mode plus the two tone gates.
///
/// `is_keying` is the operator's own key and is only ever set while
/// transmitting. `tone_active` is the gate used by sequenced playback and is
/// only ever set while the radio is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RadioState {
    pub mode: RadioMode,
    pub is_keying: bool,
    pub tone_active: bool,
}

impl RadioState {
    /// True when both gate invariants hold.
    pub fn is_consistent(&self) -> bool {
        let keying_ok = !self.is_keying || self.mode == RadioMode::Transmitting;
        let tone_ok = !self.tone_active || self.mode != RadioMode::Off;
        keying_ok && tone_ok
    }
}

/// Simulated HF band conditions.
///
/// Levels and depth are normalized to 0.0..=1.0; `fading_rate` is in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandConditionsConfig {
    pub enabled: bool,
    pub noise_level: f32,
    pub fading_enabled: bool,
    pub fading_depth: f32,
    pub fading_rate: f32,
    pub interference_enabled: bool,
    pub interference_level: f32,
}

impl BandConditionsConfig {
    /// Copy with every normalized field clamped into range.
    /// Non-finite levels become 0.0 and a non-finite rate takes the default.
    pub fn normalized(self) -> Self {
        let fading_rate = if self.fading_rate.is_finite() {
            self.fading_rate.max(0.0)
        } else {
            Self::default().fading_rate
        };
        Self {
            noise_level: unit_level(self.noise_level),
            fading_depth: unit_level(self.fading_depth),
            fading_rate,
            interference_level: unit_level(self.interference_level),
            ..self
        }
    }
}

fn unit_level(level: f32) -> f32 {
    if level.is_finite() {
        level.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl Default for BandConditionsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            noise_level: 0.3,
            fading_enabled: true,
            fading_depth: 0.5,
            fading_rate: 0.1,
            interference_enabled: false,
            interference_level: 0.2,
        }
    }
}

/// Audio output configuration, fixed for the lifetime of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Samples per render callback.
    pub buffer_size: usize,
    /// Seed for the DSP random streams; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            buffer_size: 1024,
            seed: None,
        }
    }
}

/// Current state of the audio core.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub radio: RadioState,
    pub session_active: bool,
    pub frequency: Hertz,
    pub effective_speed: Wpm,
    pub band_conditions: BandConditionsConfig,
    pub audio: AudioConfig,
}
