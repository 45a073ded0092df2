//! Effect state: what the engine has applied to the graph.
//!
//! Five independent effects share the graph; the only coupling between them
//! is the reverb send, whose level is derived by [`reverb_send_level`].

use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, EQ_BAND_COUNT};

/// 8D rotation speed presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationSpeed {
    Slow,
    #[default]
    Medium,
    Fast,
}

impl RotationSpeed {
    /// Seconds per full left-right-left rotation.
    pub fn period_seconds(self) -> f64 {
        match self {
            RotationSpeed::Slow => 8.0,
            RotationSpeed::Medium => 4.0,
            RotationSpeed::Fast => 2.0,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "slow" => Some(RotationSpeed::Slow),
            "medium" => Some(RotationSpeed::Medium),
            "fast" => Some(RotationSpeed::Fast),
            _ => None,
        }
    }
}

/// The band-limiting "degradation" slot. Lo-Fi and Retro are two flavours of
/// the same effect and cannot be active together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegradationMode {
    #[default]
    Off,
    /// Telephone / vintage radio band-limit, no distortion.
    LoFi,
    /// Cassette band-limit plus mild saturation.
    Retro,
}

impl DegradationMode {
    pub fn has_distortion(self) -> bool {
        self == DegradationMode::Retro
    }
}

/// Reverb priority: Spatial > Slowed+Reverb > Off.
///
/// A strict override, never a blend of the two levels.
pub fn reverb_send_level(spatial: bool, slowed_reverb: bool, config: &EngineConfig) -> f64 {
    if spatial {
        config.spatial_reverb_level
    } else if slowed_reverb {
        config.slowed_reverb_level
    } else {
        0.0
    }
}

/// Equalizer master switch plus the stored per-band gains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqualizerState {
    pub enabled: bool,
    pub gains_db: [f64; EQ_BAND_COUNT],
}

impl Default for EqualizerState {
    fn default() -> Self {
        EqualizerState {
            enabled: true,
            gains_db: [0.0; EQ_BAND_COUNT],
        }
    }
}

impl EqualizerState {
    /// Gain a band's filter should carry: the stored value while the switch is on, 0 dB otherwise.
    pub fn effective_gain(&self, band: usize) -> f64 {
        if self.enabled {
            self.gains_db.get(band).copied().unwrap_or(0.0)
        } else {
            0.0
        }
    }
}

/// Snapshot of every effect input the engine has applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectState {
    pub spatial: bool,
    pub slowed_reverb: bool,
    pub eight_d: bool,
    /// Rotation period in seconds; kept while 8D is off.
    pub rotation_period: f64,
    pub degradation: DegradationMode,
    pub bass_boost: bool,
    pub equalizer: EqualizerState,
    pub preserves_pitch: bool,
}

impl EffectState {
    pub fn new(config: &EngineConfig) -> Self {
        EffectState {
            spatial: false,
            slowed_reverb: false,
            eight_d: false,
            rotation_period: config.rotation_period,
            degradation: DegradationMode::Off,
            bass_boost: false,
            equalizer: EqualizerState::default(),
            preserves_pitch: true,
        }
    }

    pub fn reverb_send(&self, config: &EngineConfig) -> f64 {
        reverb_send_level(self.spatial, self.slowed_reverb, config)
    }
}
