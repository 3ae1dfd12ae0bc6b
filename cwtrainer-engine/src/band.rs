//! Simulated HF band conditions: fading (QSB), atmospheric noise (QRN) and
//! co-channel interference (QRM).
//!
//! [`BandConditionsProcessor::process_sample`] is called once per rendered
//! sample on the render thread. It never allocates and never locks; all of its
//! randomness comes from the generator it owns, so a fixed seed reproduces the
//! exact same band.

use std::f32::consts::TAU;

use cwtrainer_messages::BandConditionsConfig;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Pole/gain pairs of the three-pole pink noise filter.
const PINK_POLES: [(f32, f32); 3] = [
    (0.99765, 0.0990460),
    (0.96300, 0.2965164),
    (0.57000, 1.0526913),
];
/// Direct white noise contribution to the pink output.
const PINK_WHITE_GAIN: f32 = 0.1848;
const NOISE_SCALE: f32 = 0.15;

/// Largest random-walk perturbation of the fading target.
const WALK_STEP: f32 = 0.15;
const WALK_STEPS_PER_HZ: f32 = 4.0;
const MIN_WALK_STEPS_PER_SECOND: f32 = 2.0;
const FADE_RAMP_SECONDS: f32 = 0.010;

const CRASH_PROBABILITY: f64 = 2.0e-5;
const CRASH_DECAY: f32 = 0.995;
const CRASH_SECONDS: (f32, f32) = (0.010, 0.050);
const CRASH_AMPLITUDE: (f32, f32) = (0.2, 0.6);

const INTERFERENCE_PROBABILITY: f64 = 1.0e-5;
const INTERFERENCE_OFFSET_HZ: (f32, f32) = (50.0, 200.0);
const INTERFERENCE_SECONDS: (f32, f32) = (0.3, 2.0);
const INTERFERENCE_GAIN: f32 = 0.3;

#[derive(Debug, Clone, Copy, Default)]
struct PinkFilter {
    taps: [f32; 3],
}

impl PinkFilter {
    #[inline]
    fn next(&mut self, white: f32) -> f32 {
        let mut pink = white * PINK_WHITE_GAIN;
        for (tap, (pole, gain)) in self.taps.iter_mut().zip(PINK_POLES) {
            *tap = pole * *tap + white * gain;
            pink += *tap;
        }
        pink
    }
}

/// Bounded random walk of the fading gain.
#[derive(Debug, Clone, Copy)]
struct Fading {
    current: f32,
    target: f32,
    increment: f32,
    ramp_remaining: u32,
    walk_countdown: u32,
}

impl Default for Fading {
    fn default() -> Self {
        Self {
            current: 1.0,
            target: 1.0,
            increment: 0.0,
            ramp_remaining: 0,
            walk_countdown: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Crash {
    amplitude: f32,
    remaining: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct Interference {
    active: bool,
    frequency: f32,
    phase: f32,
    remaining: u32,
}

pub struct BandConditionsProcessor {
    config: BandConditionsConfig,
    sample_rate: f32,
    carrier: f32,
    seed: Option<u64>,
    rng: ChaCha8Rng,
    pink: PinkFilter,
    fading: Fading,
    crash: Crash,
    interference: Interference,
    envelope: f32,
}

impl BandConditionsProcessor {
    /// Create a processor; `seed` of `None` draws the generator from entropy.
    pub fn new(config: BandConditionsConfig, sample_rate: u32, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            config: config.normalized(),
            sample_rate: sample_rate.max(1) as f32,
            carrier: 600.0,
            seed,
            rng,
            pink: PinkFilter::default(),
            fading: Fading::default(),
            crash: Crash::default(),
            interference: Interference::default(),
            envelope: 1.0,
        }
    }

    pub fn config(&self) -> &BandConditionsConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Replace the configuration. Running filter state is kept; callers swap
    /// configuration only between sessions and reset afterwards.
    pub fn set_config(&mut self, config: BandConditionsConfig) {
        self.config = config.normalized();
    }

    /// Nominal carrier the interference offsets are measured from.
    pub fn set_carrier(&mut self, carrier_hz: f32) {
        self.carrier = carrier_hz;
    }

    /// Envelope applied by fading to the last processed sample.
    pub fn envelope(&self) -> f32 {
        self.envelope
    }

    pub fn is_crashing(&self) -> bool {
        self.crash.remaining > 0
    }

    pub fn is_interfering(&self) -> bool {
        self.interference.active
    }

    pub fn pink_taps(&self) -> [f32; 3] {
        self.pink.taps
    }

    /// Zero every filter and timer. A seeded generator restarts its stream,
    /// so a reset processor renders exactly like a freshly built one.
    pub fn reset(&mut self) {
        if let Some(seed) = self.seed {
            self.rng = ChaCha8Rng::seed_from_u64(seed);
        }
        self.pink = PinkFilter::default();
        self.fading = Fading::default();
        self.crash = Crash::default();
        self.interference = Interference::default();
        self.envelope = 1.0;
    }

    /// Degrade one sample: fade, then add noise, then add interference.
    #[inline]
    pub fn process_sample(&mut self, sample: f32) -> f32 {
        if !self.config.enabled {
            return sample;
        }

        self.envelope = if self.config.fading_enabled {
            let gain = self.next_fading_gain();
            1.0 - self.config.fading_depth * (1.0 - gain)
        } else {
            1.0
        };
        let mut out = sample * self.envelope;

        if self.config.noise_level > 0.0 {
            out += self.next_noise();
        }

        if self.config.interference_enabled && self.config.interference_level > 0.0 {
            out += self.next_interference();
        }

        out.clamp(-1.0, 1.0)
    }

    /// Begin a static crash with random length and amplitude.
    pub fn start_crash(&mut self) {
        let seconds = self.rng.gen_range(CRASH_SECONDS.0..=CRASH_SECONDS.1);
        let amplitude = self.rng.gen_range(CRASH_AMPLITUDE.0..=CRASH_AMPLITUDE.1);
        self.crash = Crash {
            amplitude: amplitude * self.config.noise_level,
            remaining: self.seconds_to_samples(seconds),
        };
    }

    /// Begin an interfering carrier offset from the nominal one.
    pub fn start_interference(&mut self) {
        let offset = self
            .rng
            .gen_range(INTERFERENCE_OFFSET_HZ.0..=INTERFERENCE_OFFSET_HZ.1);
        let offset = if self.rng.gen_bool(0.5) { offset } else { -offset };
        let seconds = self
            .rng
            .gen_range(INTERFERENCE_SECONDS.0..=INTERFERENCE_SECONDS.1);
        self.interference = Interference {
            active: true,
            frequency: (self.carrier + offset).max(1.0),
            phase: 0.0,
            remaining: self.seconds_to_samples(seconds),
        };
    }

    fn next_fading_gain(&mut self) -> f32 {
        if self.fading.walk_countdown == 0 {
            let step = self.rng.gen_range(-WALK_STEP..=WALK_STEP);
            let ramp = self.seconds_to_samples(FADE_RAMP_SECONDS);
            let interval = self.walk_interval();
            let fading = &mut self.fading;
            fading.target = (fading.target + step).clamp(0.0, 1.0);
            fading.increment = (fading.target - fading.current) / ramp as f32;
            fading.ramp_remaining = ramp;
            fading.walk_countdown = interval;
        }

        let fading = &mut self.fading;
        fading.walk_countdown -= 1;
        if fading.ramp_remaining > 0 {
            fading.ramp_remaining -= 1;
            fading.current = if fading.ramp_remaining == 0 {
                fading.target
            } else {
                (fading.current + fading.increment).clamp(0.0, 1.0)
            };
        }
        fading.current
    }

    fn next_noise(&mut self) -> f32 {
        let level = self.config.noise_level;
        let white = self.rng.gen_range(-1.0f32..=1.0);
        let mut noise = self.pink.next(white) * level * NOISE_SCALE;

        if self.crash.remaining > 0 {
            let burst = self.rng.gen_range(-1.0f32..=1.0);
            noise += burst * self.crash.amplitude;
            self.crash.amplitude *= CRASH_DECAY;
            self.crash.remaining -= 1;
        } else if self.rng.gen_bool(CRASH_PROBABILITY * level as f64) {
            self.start_crash();
        }
        noise
    }

    fn next_interference(&mut self) -> f32 {
        let level = self.config.interference_level;
        if !self.interference.active {
            if self.rng.gen_bool(INTERFERENCE_PROBABILITY * level as f64) {
                self.start_interference();
            }
            return 0.0;
        }

        let qrm = &mut self.interference;
        let out = qrm.phase.sin() * level * INTERFERENCE_GAIN;
        qrm.phase = (qrm.phase + TAU * qrm.frequency / self.sample_rate) % TAU;
        qrm.remaining = qrm.remaining.saturating_sub(1);
        if qrm.remaining == 0 {
            qrm.active = false;
        }
        out
    }

    /// Samples between two random-walk steps, at least two steps a second.
    fn walk_interval(&self) -> u32 {
        let steps = (self.config.fading_rate * WALK_STEPS_PER_HZ).max(MIN_WALK_STEPS_PER_SECOND);
        ((self.sample_rate / steps) as u32).max(1)
    }

    fn seconds_to_samples(&self, seconds: f32) -> u32 {
        ((seconds * self.sample_rate) as u32).max(1)
    }
}
