/// Frequency in Hertz.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Hertz(pub f32);

impl std::fmt::Display for Hertz {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1} Hz", self.0)
    }
}

impl Hertz {
    /// Clamp into an inclusive range.
    pub fn clamp(self, min: Hertz, max: Hertz) -> Self {
        Self(self.0.clamp(min.0, max.0))
    }

    pub const fn as_hz(self) -> f32 {
        self.0
    }
}

impl From<f32> for Hertz {
    fn from(hz: f32) -> Self {
        Self(hz)
    }
}

impl From<Hertz> for f32 {
    fn from(hz: Hertz) -> Self {
        hz.0
    }
}

/// Morse speed in words per minute (PARIS standard).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Wpm(pub u32);

impl std::fmt::Display for Wpm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} WPM", self.0)
    }
}

impl Wpm {
    pub const fn as_wpm(self) -> u32 {
        self.0
    }
}

impl From<u32> for Wpm {
    fn from(wpm: u32) -> Self {
        Self(wpm)
    }
}
