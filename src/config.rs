//! Engine configuration.
//!
//! Every field has a default, so a host only needs to supply what it wants to
//! change: `EngineConfig::from_json("{\"reverb_seconds\": 2.0}")`.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Number of equalizer bands.
pub const EQ_BAND_COUNT: usize = 6;

/// Ramp windows in seconds, per kind of parameter change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RampTimes {
    /// Spatial low-pass sweep.
    pub spatial: f64,
    /// Lo-fi / retro band-limit sweeps.
    pub degradation: f64,
    /// 8D LFO depth (enable/disable).
    pub pan_depth: f64,
    /// 8D rotation speed changes.
    pub rotation: f64,
    /// Bass boost shelf gain.
    pub bass_boost: f64,
    /// Reverb send level.
    pub reverb_send: f64,
}

impl Default for RampTimes {
    fn default() -> Self {
        RampTimes {
            spatial: 0.2,
            degradation: 0.3,
            pan_depth: 0.3,
            rotation: 0.1,
            bass_boost: 0.2,
            reverb_send: 0.1,
        }
    }
}

/// Band-limit settings for one degradation variant. Q values are in dB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandLimit {
    pub highpass_hz: f64,
    pub highpass_q: f64,
    pub lowpass_hz: f64,
    pub lowpass_q: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Processing block size in frames.
    pub render_quantum: usize,
    /// Sample rate used by the offline backend.
    pub sample_rate: f64,
    /// Offline contexts start suspended, like a browser before a user gesture.
    pub start_suspended: bool,

    pub eq_frequencies: [f64; EQ_BAND_COUNT],
    /// Resonance of the four peaking bands.
    pub eq_q: f64,
    /// Per-band gain limit in dB (applied symmetrically).
    pub eq_max_gain_db: f64,

    /// Spatial mode low-pass cutoff.
    pub spatial_cutoff_hz: f64,

    pub lofi: BandLimit,
    pub retro: BandLimit,
    /// Drive of the retro saturation curve.
    pub retro_drive: f64,
    /// High-pass cutoff used when degradation is off (0 Hz is not reachable by
    /// an exponential ramp).
    pub degradation_off_highpass_hz: f64,
    pub degradation_off_q: f64,

    pub bass_boost_hz: f64,
    pub bass_boost_db: f64,

    pub reverb_seconds: f64,
    pub reverb_decay: f64,
    pub reverb_seed: u64,
    /// Wet level while Spatial mode is on.
    pub spatial_reverb_level: f64,
    /// Wet level while only Slowed+Reverb is on.
    pub slowed_reverb_level: f64,

    /// Playback rate applied by Slowed+Reverb.
    pub slowed_rate: f64,
    /// Default 8D rotation period in seconds.
    pub rotation_period: f64,

    pub ramps: RampTimes,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            render_quantum: 128,
            sample_rate: 44100.0,
            start_suspended: true,
            eq_frequencies: [60.0, 250.0, 1000.0, 4000.0, 8000.0, 16000.0],
            eq_q: 1.4,
            eq_max_gain_db: 12.0,
            spatial_cutoff_hz: 800.0,
            lofi: BandLimit {
                highpass_hz: 500.0,
                highpass_q: 0.8,
                lowpass_hz: 3000.0,
                lowpass_q: 0.5,
            },
            retro: BandLimit {
                highpass_hz: 250.0,
                highpass_q: 0.7,
                lowpass_hz: 4000.0,
                lowpass_q: 0.7,
            },
            retro_drive: 8.0,
            degradation_off_highpass_hz: 10.0,
            degradation_off_q: 0.5,
            bass_boost_hz: 100.0,
            bass_boost_db: 9.0,
            reverb_seconds: 3.0,
            reverb_decay: 2.0,
            reverb_seed: 0x5EED_CAFE,
            spatial_reverb_level: 0.8,
            slowed_reverb_level: 0.6,
            slowed_rate: 0.85,
            rotation_period: 4.0,
            ramps: RampTimes::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON config and validate it.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges the graph relies on.
    pub fn validate(&self) -> EngineResult<()> {
        let invalid = |msg: String| Err(EngineError::InvalidConfig(msg));

        if self.render_quantum == 0 || self.render_quantum > 8192 {
            return invalid(format!("render_quantum {} out of range 1..=8192", self.render_quantum));
        }
        if !(self.sample_rate.is_finite() && self.sample_rate >= 8000.0) {
            return invalid(format!("sample_rate {} must be at least 8000", self.sample_rate));
        }
        if self.eq_frequencies.iter().any(|f| !(f.is_finite() && *f > 0.0)) {
            return invalid("eq_frequencies must be positive".to_string());
        }
        if self.eq_frequencies.windows(2).any(|w| w[0] >= w[1]) {
            return invalid("eq_frequencies must be strictly ascending".to_string());
        }
        if !(self.reverb_seconds > 0.0 && self.reverb_seconds <= 10.0) {
            return invalid(format!("reverb_seconds {} out of range (0, 10]", self.reverb_seconds));
        }
        if !(self.slowed_rate > 0.0 && self.slowed_rate.is_finite()) {
            return invalid(format!("slowed_rate {} must be positive", self.slowed_rate));
        }
        if !(self.rotation_period > 0.0 && self.rotation_period.is_finite()) {
            return invalid(format!("rotation_period {} must be positive", self.rotation_period));
        }
        let ramps = &self.ramps;
        let windows = [
            ramps.spatial,
            ramps.degradation,
            ramps.pan_depth,
            ramps.rotation,
            ramps.bass_boost,
            ramps.reverb_send,
        ];
        if windows.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
            return invalid("ramp times must be non-negative".to_string());
        }
        Ok(())
    }
}
