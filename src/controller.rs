//! Effect controller: the user-facing effect settings and the policy that
//! ties them to the engine.
//!
//! The engine applies one effect at a time and knows nothing about playback
//! rate policy. The controller keeps the persisted settings, coordinates
//! Slowed+Reverb with rate and pitch, and replays everything once the engine
//! has a graph.

use serde::{Deserialize, Serialize};

use crate::config::EQ_BAND_COUNT;
use crate::context::AudioBackend;
use crate::effects::{DegradationMode, RotationSpeed};
use crate::engine::AudioEngine;
use crate::equalizer::{clamp_gain, EqualizerPreset};
use crate::error::EngineResult;

/// Effect choices as the host persists them between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectSettings {
    pub slowed_reverb: bool,
    pub spatial: bool,
    pub eight_d: bool,
    pub rotation_speed: RotationSpeed,
    pub degradation: DegradationMode,
    pub bass_boost: bool,
    pub equalizer_enabled: bool,
    pub equalizer_gains: [f64; EQ_BAND_COUNT],
    pub playback_rate: f64,
}

impl Default for EffectSettings {
    fn default() -> Self {
        EffectSettings {
            slowed_reverb: false,
            spatial: false,
            eight_d: false,
            rotation_speed: RotationSpeed::Medium,
            degradation: DegradationMode::Off,
            bass_boost: false,
            equalizer_enabled: true,
            equalizer_gains: [0.0; EQ_BAND_COUNT],
            playback_rate: 1.0,
        }
    }
}

impl EffectSettings {
    pub fn from_json(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EffectController {
    settings: EffectSettings,
    /// Rate to restore when Slowed+Reverb turns off.
    previous_rate: Option<f64>,
}

impl EffectController {
    pub fn new(settings: EffectSettings) -> Self {
        EffectController {
            settings,
            previous_rate: None,
        }
    }

    pub fn settings(&self) -> &EffectSettings {
        &self.settings
    }

    pub fn set_playback_rate<B: AudioBackend>(&mut self, engine: &mut AudioEngine<B>, rate: f64) {
        engine.set_playback_rate(rate);
        self.settings.playback_rate = engine.playback_rate();
    }

    /// Slowed+Reverb: slower rate, no pitch correction, and the reverb input.
    /// Turning it off restores the rate that was active before.
    pub fn set_slowed_reverb<B: AudioBackend>(&mut self, engine: &mut AudioEngine<B>, enabled: bool) {
        let slowed_rate = engine.config().slowed_rate;
        self.settings.slowed_reverb = enabled;

        if enabled {
            let current = self.settings.playback_rate;
            if current != slowed_rate {
                self.previous_rate = Some(current);
            } else if self.previous_rate.is_none() {
                // Already slowed with nothing remembered: assume normal speed.
                self.previous_rate = Some(1.0);
            }
            self.set_playback_rate(engine, slowed_rate);
            engine.set_pitch_preservation(false);
            engine.set_slowed_reverb_mode(true);
        } else {
            engine.set_pitch_preservation(true);
            engine.set_slowed_reverb_mode(false);
            // Consumed so a repeated disable keeps any rate chosen since.
            if let Some(rate) = self.previous_rate.take() {
                self.set_playback_rate(engine, rate);
            }
        }
    }

    pub fn toggle_slowed_reverb<B: AudioBackend>(&mut self, engine: &mut AudioEngine<B>) {
        let enabled = !self.settings.slowed_reverb;
        self.set_slowed_reverb(engine, enabled);
    }

    pub fn set_spatial<B: AudioBackend>(&mut self, engine: &mut AudioEngine<B>, enabled: bool) {
        self.settings.spatial = enabled;
        engine.set_spatial_mode(enabled);
    }

    pub fn set_8d<B: AudioBackend>(&mut self, engine: &mut AudioEngine<B>, enabled: bool) {
        self.settings.eight_d = enabled;
        engine.set_8d_audio_mode(enabled, self.settings.rotation_speed.period_seconds());
    }

    /// Store the speed; the engine only follows while 8D is on.
    pub fn change_rotation_speed<B: AudioBackend>(
        &mut self,
        engine: &mut AudioEngine<B>,
        speed: RotationSpeed,
    ) {
        self.settings.rotation_speed = speed;
        engine.set_8d_rotation_speed(speed.period_seconds());
    }

    pub fn set_degradation<B: AudioBackend>(
        &mut self,
        engine: &mut AudioEngine<B>,
        mode: DegradationMode,
    ) {
        self.settings.degradation = mode;
        engine.set_degradation(mode);
    }

    /// Lo-Fi on, or off if Lo-Fi is the active variant.
    pub fn set_lofi<B: AudioBackend>(&mut self, engine: &mut AudioEngine<B>, enabled: bool) {
        self.toggle_degradation(engine, DegradationMode::LoFi, enabled);
    }

    /// Retro on, or off if Retro is the active variant.
    pub fn set_retro<B: AudioBackend>(&mut self, engine: &mut AudioEngine<B>, enabled: bool) {
        self.toggle_degradation(engine, DegradationMode::Retro, enabled);
    }

    fn toggle_degradation<B: AudioBackend>(
        &mut self,
        engine: &mut AudioEngine<B>,
        variant: DegradationMode,
        enabled: bool,
    ) {
        if enabled {
            self.set_degradation(engine, variant);
        } else if self.settings.degradation == variant {
            self.set_degradation(engine, DegradationMode::Off);
        }
    }

    pub fn set_bass_boost<B: AudioBackend>(&mut self, engine: &mut AudioEngine<B>, enabled: bool) {
        self.settings.bass_boost = enabled;
        engine.set_bass_boost_mode(enabled);
    }

    pub fn set_equalizer_enabled<B: AudioBackend>(
        &mut self,
        engine: &mut AudioEngine<B>,
        enabled: bool,
    ) {
        self.settings.equalizer_enabled = enabled;
        engine.set_equalizer_enabled(enabled);
    }

    pub fn set_equalizer_band<B: AudioBackend>(
        &mut self,
        engine: &mut AudioEngine<B>,
        band: usize,
        gain_db: f64,
    ) {
        if let Some(slot) = self.settings.equalizer_gains.get_mut(band) {
            *slot = clamp_gain(gain_db, engine.config());
        }
        engine.set_equalizer_band(band, gain_db);
    }

    pub fn apply_equalizer_preset<B: AudioBackend>(
        &mut self,
        engine: &mut AudioEngine<B>,
        preset: EqualizerPreset,
    ) {
        self.settings.equalizer_gains = preset.gains();
        engine.apply_equalizer_preset(preset);
    }

    /// Push every stored setting to the engine. Hosts call this once
    /// `initialize()` succeeds; graph effects are dropped before that.
    ///
    /// Rehydrated Slowed+Reverb goes through [`Self::set_slowed_reverb`] so a
    /// later disable has a rate to return to.
    pub fn apply_all<B: AudioBackend>(&mut self, engine: &mut AudioEngine<B>) {
        if !engine.is_initialized() {
            log::debug!("Applying settings before initialize; graph effects will be dropped");
        }
        let s = self.settings.clone();
        if s.slowed_reverb {
            self.set_slowed_reverb(engine, true);
        } else {
            engine.set_playback_rate(s.playback_rate);
            engine.set_pitch_preservation(true);
            engine.set_slowed_reverb_mode(false);
        }
        engine.set_spatial_mode(s.spatial);
        engine.set_8d_audio_mode(s.eight_d, s.rotation_speed.period_seconds());
        engine.set_degradation(s.degradation);
        engine.set_bass_boost_mode(s.bass_boost);
        engine.set_equalizer_bands(&s.equalizer_gains);
        engine.set_equalizer_enabled(s.equalizer_enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::context::{OfflineBackend, OfflineHandle};

    fn running() -> (AudioEngine<OfflineBackend>, OfflineHandle) {
        let backend = OfflineBackend::new();
        let handle = backend.handle();
        let config = EngineConfig {
            reverb_seconds: 0.1,
            ..EngineConfig::default()
        };
        let mut engine = AudioEngine::new(backend, config);
        engine.initialize().unwrap();
        engine.resume_context().unwrap();
        (engine, handle)
    }

    fn reverb_send(engine: &AudioEngine<OfflineBackend>) -> f64 {
        engine.targets().unwrap().reverb_send
    }

    #[test]
    fn slowed_reverb_round_trip() {
        let (mut engine, handle) = running();
        let mut controller = EffectController::default();
        assert_eq!(engine.playback_rate(), 1.0);

        controller.set_slowed_reverb(&mut engine, true);
        assert_eq!(engine.playback_rate(), 0.85);
        assert!(!engine.preserves_pitch());
        assert_eq!(reverb_send(&engine), 0.6);

        handle.advance(0.2);
        controller.set_slowed_reverb(&mut engine, false);
        assert_eq!(engine.playback_rate(), 1.0);
        assert!(engine.preserves_pitch());
        assert_eq!(reverb_send(&engine), 0.0);
    }

    #[test]
    fn slowed_reverb_restores_custom_rate() {
        let (mut engine, _) = running();
        let mut controller = EffectController::default();
        controller.set_playback_rate(&mut engine, 1.25);
        controller.toggle_slowed_reverb(&mut engine);
        assert_eq!(controller.settings().playback_rate, 0.85);
        controller.toggle_slowed_reverb(&mut engine);
        assert_eq!(engine.playback_rate(), 1.25);
    }

    #[test]
    fn already_slowed_rate_falls_back_to_normal_speed() {
        let (mut engine, _) = running();
        let mut controller = EffectController::default();
        controller.set_playback_rate(&mut engine, 0.85);
        controller.set_slowed_reverb(&mut engine, true);
        controller.set_slowed_reverb(&mut engine, false);
        assert_eq!(engine.playback_rate(), 1.0);
    }

    #[test]
    fn rehydrated_slowed_reverb_disables_to_normal_speed() {
        let (mut engine, _) = running();
        let saved = EffectSettings {
            slowed_reverb: true,
            playback_rate: 0.85,
            ..EffectSettings::default()
        };
        let mut controller = EffectController::new(saved);
        controller.apply_all(&mut engine);
        assert_eq!(engine.playback_rate(), 0.85);
        assert!(!engine.preserves_pitch());
        assert_eq!(reverb_send(&engine), 0.6);

        controller.apply_all(&mut engine);
        controller.set_slowed_reverb(&mut engine, false);
        assert_eq!(engine.playback_rate(), 1.0);
        assert!(engine.preserves_pitch());
        assert_eq!(controller.settings().playback_rate, 1.0);
    }

    #[test]
    fn repeated_disable_keeps_the_chosen_rate() {
        let (mut engine, _) = running();
        let mut controller = EffectController::default();
        controller.set_slowed_reverb(&mut engine, true);
        controller.set_slowed_reverb(&mut engine, false);
        assert_eq!(engine.playback_rate(), 1.0);

        controller.set_playback_rate(&mut engine, 1.5);
        controller.set_slowed_reverb(&mut engine, false);
        assert_eq!(engine.playback_rate(), 1.5);
        assert_eq!(controller.settings().playback_rate, 1.5);
    }

    #[test]
    fn stored_band_gains_match_what_the_engine_applies() {
        let (mut engine, _) = running();
        let mut controller = EffectController::default();
        controller.set_equalizer_band(&mut engine, 0, 30.0);
        controller.set_equalizer_band(&mut engine, 5, -30.0);
        controller.set_equalizer_band(&mut engine, 9, 3.0);

        let stored = controller.settings().equalizer_gains;
        assert_eq!(stored, [12.0, 0.0, 0.0, 0.0, 0.0, -12.0]);
        assert_eq!(stored, engine.effects().equalizer.gains_db);
    }

    #[test]
    fn spatial_wins_over_slowed_reverb() {
        let (mut engine, _) = running();
        let mut controller = EffectController::default();
        controller.set_slowed_reverb(&mut engine, true);
        controller.set_spatial(&mut engine, true);
        assert_eq!(reverb_send(&engine), 0.8);
        controller.set_spatial(&mut engine, false);
        assert_eq!(reverb_send(&engine), 0.6);
    }

    #[test]
    fn bass_boost_end_to_end() {
        let (mut engine, handle) = running();
        let mut controller = EffectController::default();
        controller.set_bass_boost(&mut engine, true);
        handle.advance(0.3);
        assert_eq!(engine.snapshot().unwrap().bass_boost_db, 9.0);
        controller.set_bass_boost(&mut engine, false);
        handle.advance(0.3);
        assert_eq!(engine.snapshot().unwrap().bass_boost_db, 0.0);
    }

    #[test]
    fn rotation_speed_follows_only_while_enabled() {
        let (mut engine, _) = running();
        let mut controller = EffectController::default();
        controller.set_8d(&mut engine, true);
        assert_eq!(engine.targets().unwrap().rotation_hz, 0.25);

        controller.change_rotation_speed(&mut engine, RotationSpeed::Fast);
        assert_eq!(engine.targets().unwrap().rotation_hz, 0.5);

        controller.set_8d(&mut engine, false);
        controller.change_rotation_speed(&mut engine, RotationSpeed::Slow);
        assert_eq!(engine.targets().unwrap().rotation_hz, 0.5);
        assert!(!engine.effects().eight_d);

        controller.set_8d(&mut engine, true);
        assert_eq!(engine.targets().unwrap().rotation_hz, 0.125);
    }

    #[test]
    fn apply_all_replays_settings_made_before_initialize() {
        let backend = OfflineBackend::new();
        let mut engine = AudioEngine::new(backend, EngineConfig::default());
        let mut controller = EffectController::default();

        controller.set_spatial(&mut engine, true);
        controller.set_degradation(&mut engine, DegradationMode::Retro);
        controller.set_equalizer_band(&mut engine, 4, 3.0);
        controller.set_8d(&mut engine, true);
        assert!(!engine.effects().spatial, "Engine drops calls before initialize");

        engine.initialize().unwrap();
        controller.apply_all(&mut engine);

        let effects = engine.effects();
        assert!(effects.spatial && effects.eight_d);
        assert_eq!(effects.degradation, DegradationMode::Retro);
        let targets = engine.targets().unwrap();
        assert_eq!(targets.spatial_cutoff_hz, 800.0);
        assert_eq!(targets.eq_gains_db[4], 3.0);
        assert!(targets.distortion);
    }

    #[test]
    fn lofi_and_retro_share_the_setting() {
        let (mut engine, _) = running();
        let mut controller = EffectController::default();
        controller.set_lofi(&mut engine, true);
        controller.set_retro(&mut engine, true);
        controller.set_lofi(&mut engine, false);
        assert_eq!(controller.settings().degradation, DegradationMode::Retro);
        controller.set_retro(&mut engine, false);
        assert_eq!(controller.settings().degradation, DegradationMode::Off);
        assert_eq!(engine.effects().degradation, DegradationMode::Off);
    }

    #[test]
    fn presets_update_stored_gains() {
        let (mut engine, _) = running();
        let mut controller = EffectController::default();
        controller.apply_equalizer_preset(&mut engine, EqualizerPreset::Vocal);
        assert_eq!(controller.settings().equalizer_gains, EqualizerPreset::Vocal.gains());
        assert_eq!(engine.effects().equalizer.gains_db, EqualizerPreset::Vocal.gains());
    }

    #[test]
    fn settings_parse_with_defaults() {
        let settings = EffectSettings::from_json(r#"{"spatial": true, "rotation_speed": "fast"}"#).unwrap();
        assert!(settings.spatial);
        assert_eq!(settings.rotation_speed, RotationSpeed::Fast);
        assert_eq!(settings.playback_rate, 1.0);
        assert!(settings.equalizer_enabled);

        let json = settings.to_json().unwrap();
        assert!(json.contains("\"rotation_speed\":\"fast\""), "{json}");
        assert!(EffectSettings::from_json("{\"spatial\": 3}").is_err());
    }
}
