//! Six-band equalizer layout and presets.

use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, EQ_BAND_COUNT};
use crate::dsp::filter::FilterType;

/// One band of the equalizer chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqBand {
    pub frequency: f64,
    pub filter_type: FilterType,
    pub q: f64,
}

/// Band layout: low-shelf, four peaking bands, high-shelf.
pub fn band_layout(config: &EngineConfig) -> [EqBand; EQ_BAND_COUNT] {
    std::array::from_fn(|i| EqBand {
        frequency: config.eq_frequencies[i],
        filter_type: match i {
            0 => FilterType::Lowshelf,
            i if i == EQ_BAND_COUNT - 1 => FilterType::Highshelf,
            _ => FilterType::Peaking,
        },
        q: config.eq_q,
    })
}

/// Clamp a requested band gain to the configured range; non-finite input becomes 0 dB.
pub fn clamp_gain(gain_db: f64, config: &EngineConfig) -> f64 {
    if !gain_db.is_finite() {
        return 0.0;
    }
    gain_db.clamp(-config.eq_max_gain_db, config.eq_max_gain_db)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EqualizerPreset {
    Flat,
    BassBoost,
    Vocal,
    Treble,
    Loudness,
}

impl EqualizerPreset {
    pub const ALL: [EqualizerPreset; 5] = [
        EqualizerPreset::Flat,
        EqualizerPreset::BassBoost,
        EqualizerPreset::Vocal,
        EqualizerPreset::Treble,
        EqualizerPreset::Loudness,
    ];

    /// Band gains in dB, low to high.
    pub fn gains(self) -> [f64; EQ_BAND_COUNT] {
        match self {
            EqualizerPreset::Flat => [0.0; EQ_BAND_COUNT],
            EqualizerPreset::BassBoost => [6.0, 4.0, 0.0, 0.0, 0.0, 0.0],
            EqualizerPreset::Vocal => [-2.0, -1.0, 3.0, 4.0, 2.0, 0.0],
            EqualizerPreset::Treble => [0.0, 0.0, 0.0, 2.0, 4.0, 6.0],
            EqualizerPreset::Loudness => [5.0, 2.0, -1.0, 0.0, 2.0, 4.0],
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            EqualizerPreset::Flat => "flat",
            EqualizerPreset::BassBoost => "bassboost",
            EqualizerPreset::Vocal => "vocal",
            EqualizerPreset::Treble => "treble",
            EqualizerPreset::Loudness => "loudness",
        }
    }
}
