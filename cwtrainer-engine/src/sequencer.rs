//! Turns characters into timed tone and silence segments and plays them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use cwtrainer_messages::{PlaybackOutcome, Wpm};
use log::{debug, warn};

use crate::morse::{self, Element};
use crate::timing::{DAH, DIT, ELEMENT_GAP, FarnsworthTiming};

/// Longest uninterrupted sleep while waiting out a segment.
const STOP_POLL: Duration = Duration::from_millis(5);

/// One step of a playback sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Tone(Duration),
    Silence(Duration),
}

impl Segment {
    pub fn duration(&self) -> Duration {
        match self {
            Segment::Tone(d) | Segment::Silence(d) => *d,
        }
    }

    pub fn is_tone(&self) -> bool {
        matches!(self, Segment::Tone(_))
    }
}

/// Something that can switch a tone on and off.
pub trait ToneGate {
    type Error;

    fn tone_on(&mut self) -> Result<(), Self::Error>;
    fn tone_off(&mut self) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlaybackSequencer {
    timing: FarnsworthTiming,
}

impl PlaybackSequencer {
    pub fn new(effective_speed: Wpm) -> Self {
        Self {
            timing: FarnsworthTiming::new(effective_speed),
        }
    }

    pub fn timing(&self) -> &FarnsworthTiming {
        &self.timing
    }

    /// Elements of one character with element gaps between them.
    /// No trailing gap. `None` if the character has no Morse code.
    pub fn character_segments(&self, c: char) -> Option<Vec<Segment>> {
        let mut segments = Vec::new();
        for element in morse::elements(c)? {
            if !segments.is_empty() {
                segments.push(Segment::Silence(ELEMENT_GAP));
            }
            segments.push(Segment::Tone(match element {
                Element::Dit => DIT,
                Element::Dah => DAH,
            }));
        }
        Some(segments)
    }

    /// A group of characters. Each character is followed by a character gap;
    /// whitespace adds the remainder of a word gap. Unknown characters are
    /// skipped.
    pub fn group_segments(&self, text: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut after_character = false;

        for c in text.chars() {
            if c.is_whitespace() {
                if after_character {
                    segments.push(Segment::Silence(self.timing.word_gap_after_character()));
                    after_character = false;
                }
                continue;
            }

            match self.character_segments(c) {
                Some(character) => {
                    segments.extend(character);
                    segments.push(Segment::Silence(self.timing.character_gap()));
                    after_character = true;
                }
                None => warn!("no Morse code for {:?}, skipping", c),
            }
        }
        segments
    }

    /// Play `segments` through `gate`, checking `stop` before every segment.
    ///
    /// A stopped sequence always leaves the gate off.
    pub fn play<G: ToneGate>(
        &self,
        segments: &[Segment],
        gate: &mut G,
        stop: &AtomicBool,
    ) -> Result<PlaybackOutcome, G::Error> {
        for segment in segments {
            if stop.load(Ordering::Acquire) {
                debug!("playback stopped before {:?}", segment);
                return Ok(PlaybackOutcome::Stopped);
            }

            match *segment {
                Segment::Tone(duration) => {
                    gate.tone_on()?;
                    let finished = wait(duration, stop);
                    gate.tone_off()?;
                    if !finished {
                        return Ok(PlaybackOutcome::Stopped);
                    }
                }
                Segment::Silence(duration) => {
                    if !wait(duration, stop) {
                        return Ok(PlaybackOutcome::Stopped);
                    }
                }
            }
        }
        Ok(PlaybackOutcome::Completed)
    }
}

/// Sleep until `duration` has elapsed. Returns `false` if `stop` was raised
/// first.
pub fn wait(duration: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if stop.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(STOP_POLL));
    }
}

/// Total length of a sequence.
pub fn total_duration(segments: &[Segment]) -> Duration {
    segments.iter().map(Segment::duration).sum()
}
