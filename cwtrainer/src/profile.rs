//! Practice profile loaded from JSON.
//!
//! Every field is optional; whatever is missing keeps the core's default.
//!
//! ```json
//! {
//!   "frequency": 650.0,
//!   "effective_speed": 12,
//!   "band": { "enabled": true, "noise_level": 0.4, "interference_enabled": true }
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use cwtrainer_engine::AudioCore;
use cwtrainer_messages::{BandConditionsConfig, Hertz, Wpm};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    #[serde(default)]
    pub frequency: Option<f32>,
    #[serde(default)]
    pub effective_speed: Option<u32>,
    #[serde(default)]
    pub band: Option<BandProfile>,
}

/// Band conditions as written in a profile. Missing fields take the
/// [`BandConditionsConfig`] defaults, except `enabled`, which a profile turns
/// on unless it says otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BandProfile {
    pub enabled: bool,
    pub noise_level: f32,
    pub fading_enabled: bool,
    pub fading_depth: f32,
    pub fading_rate: f32,
    pub interference_enabled: bool,
    pub interference_level: f32,
}

impl Default for BandProfile {
    fn default() -> Self {
        let base = BandConditionsConfig::default();
        Self {
            enabled: true,
            noise_level: base.noise_level,
            fading_enabled: base.fading_enabled,
            fading_depth: base.fading_depth,
            fading_rate: base.fading_rate,
            interference_enabled: base.interference_enabled,
            interference_level: base.interference_level,
        }
    }
}

impl From<&BandProfile> for BandConditionsConfig {
    fn from(band: &BandProfile) -> Self {
        BandConditionsConfig {
            enabled: band.enabled,
            noise_level: band.noise_level,
            fading_enabled: band.fading_enabled,
            fading_depth: band.fading_depth,
            fading_rate: band.fading_rate,
            interference_enabled: band.interference_enabled,
            interference_level: band.interference_level,
        }
    }
}

impl Profile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading profile {}", path.display()))?;
        let profile = Self::parse(&text)
            .with_context(|| format!("parsing profile {}", path.display()))?;
        debug!("loaded profile {}: {:?}", path.display(), profile);
        Ok(profile)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn band_conditions(&self) -> Option<BandConditionsConfig> {
        self.band.as_ref().map(BandConditionsConfig::from)
    }

    /// Push the profile's settings into `core`.
    pub fn apply(&self, core: &AudioCore) {
        if let Some(hz) = self.frequency {
            core.set_frequency(Hertz(hz));
        }
        if let Some(wpm) = self.effective_speed {
            core.set_effective_speed(Wpm(wpm));
        }
        if let Some(band) = self.band_conditions() {
            core.configure_band_conditions(band);
        }
    }
}
