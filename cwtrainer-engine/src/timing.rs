//! Farnsworth timing.
//!
//! Elements are always sent at 20 WPM; a lower effective speed only stretches
//! the gaps between characters and words.

use std::time::Duration;

use cwtrainer_messages::Wpm;

/// Speed at which dits and dahs are formed.
pub const CHARACTER_SPEED: Wpm = Wpm(20);
pub const MIN_EFFECTIVE_SPEED: Wpm = Wpm(10);
pub const MAX_EFFECTIVE_SPEED: Wpm = Wpm(18);

pub const DIT: Duration = Duration::from_millis(60);
pub const DAH: Duration = Duration::from_millis(180);
pub const ELEMENT_GAP: Duration = Duration::from_millis(60);
pub const STANDARD_CHARACTER_GAP: Duration = Duration::from_millis(180);
pub const STANDARD_WORD_GAP: Duration = Duration::from_millis(420);

/// Clamp an effective speed into the supported Farnsworth range.
pub fn clamp_effective_speed(wpm: Wpm) -> Wpm {
    Wpm(wpm.0.clamp(MIN_EFFECTIVE_SPEED.0, MAX_EFFECTIVE_SPEED.0))
}

/// Gap lengths for one effective speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FarnsworthTiming {
    effective_speed: Wpm,
    character_gap: Duration,
    word_gap: Duration,
}

impl FarnsworthTiming {
    pub fn new(effective_speed: Wpm) -> Self {
        let effective_speed = clamp_effective_speed(effective_speed);
        let extra = extra_time(effective_speed);
        Self {
            effective_speed,
            character_gap: STANDARD_CHARACTER_GAP + Duration::from_secs_f64(extra * 3.0 / 19.0),
            word_gap: STANDARD_WORD_GAP + Duration::from_secs_f64(extra * 7.0 / 19.0),
        }
    }

    pub fn effective_speed(&self) -> Wpm {
        self.effective_speed
    }

    pub fn character_gap(&self) -> Duration {
        self.character_gap
    }

    pub fn word_gap(&self) -> Duration {
        self.word_gap
    }

    /// Silence a space adds after the character gap already waited.
    pub fn word_gap_after_character(&self) -> Duration {
        self.word_gap.saturating_sub(self.character_gap)
    }
}

impl Default for FarnsworthTiming {
    fn default() -> Self {
        Self::new(MAX_EFFECTIVE_SPEED)
    }
}

/// Seconds of extra spacing per PARIS word, spread over the 19 gap units.
fn extra_time(effective_speed: Wpm) -> f64 {
    let effective = effective_speed.0 as f64;
    let character = CHARACTER_SPEED.0 as f64;
    (50.0 / effective - 50.0 / character) * 60.0 / 19.0
}
