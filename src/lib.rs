pub mod automation;
pub mod config;
pub mod context;
pub mod controller;
#[cfg(feature = "device-output")]
pub mod device;
pub mod dsp;
pub mod effects;
pub mod engine;
pub mod equalizer;
pub mod error;
pub mod graph;
pub mod render;
pub mod source;

use crate::config::EngineConfig;
use crate::context::{OfflineBackend, OfflineHandle};
use crate::controller::{EffectController, EffectSettings};
use crate::effects::RotationSpeed;
use crate::engine::AudioEngine;
use crate::equalizer::EqualizerPreset;
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the badwave-audio version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{e}"))
}

/// WASM-exposed engine for an AudioWorklet: the worklet's `process()` pulls
/// frames with [`WorkletEngine::render`], the main thread drives effects.
#[wasm_bindgen]
pub struct WorkletEngine {
    engine: AudioEngine<OfflineBackend>,
    handle: OfflineHandle,
    controller: EffectController,
}

#[wasm_bindgen]
impl WorkletEngine {
    /// `config_json` may override any [`EngineConfig`] field.
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f64, config_json: Option<String>) -> Result<WorkletEngine, JsValue> {
        let config = match config_json {
            Some(json) => EngineConfig::from_json(&json).map_err(js_error)?,
            None => EngineConfig::default(),
        };
        // The worklet is only created after a user gesture.
        let config = EngineConfig {
            start_suspended: false,
            ..config
        };
        let backend = OfflineBackend::new().with_sample_rate(sample_rate);
        let handle = backend.handle();
        Ok(WorkletEngine {
            engine: AudioEngine::new(backend, config),
            handle,
            controller: EffectController::default(),
        })
    }

    /// Build the graph and replay the stored settings.
    pub fn initialize(&mut self) -> Result<(), JsValue> {
        let was_initialized = self.engine.is_initialized();
        self.engine.initialize().map_err(js_error)?;
        if !was_initialized {
            self.controller.apply_all(&mut self.engine);
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.is_initialized()
    }

    /// Returns the context state name after resuming.
    pub fn resume(&mut self) -> Result<JsValue, JsValue> {
        let state = self.engine.resume_context().map_err(js_error)?;
        serde_wasm_bindgen::to_value(&state).map_err(js_error)
    }

    pub fn set_spatial(&mut self, enabled: bool) {
        self.controller.set_spatial(&mut self.engine, enabled);
    }

    pub fn set_slowed_reverb(&mut self, enabled: bool) {
        self.controller.set_slowed_reverb(&mut self.engine, enabled);
    }

    pub fn set_8d(&mut self, enabled: bool) {
        self.controller.set_8d(&mut self.engine, enabled);
    }

    /// `"slow"`, `"medium"` or `"fast"`; returns false for anything else.
    pub fn set_rotation_speed(&mut self, speed: &str) -> bool {
        match RotationSpeed::parse(speed) {
            Some(speed) => {
                self.controller.change_rotation_speed(&mut self.engine, speed);
                true
            }
            None => false,
        }
    }

    pub fn set_lofi(&mut self, enabled: bool) {
        self.controller.set_lofi(&mut self.engine, enabled);
    }

    pub fn set_retro(&mut self, enabled: bool) {
        self.controller.set_retro(&mut self.engine, enabled);
    }

    pub fn set_bass_boost(&mut self, enabled: bool) {
        self.controller.set_bass_boost(&mut self.engine, enabled);
    }

    pub fn set_equalizer_enabled(&mut self, enabled: bool) {
        self.controller.set_equalizer_enabled(&mut self.engine, enabled);
    }

    pub fn set_equalizer_band(&mut self, band: usize, gain_db: f64) {
        self.controller.set_equalizer_band(&mut self.engine, band, gain_db);
    }

    pub fn set_equalizer_preset(&mut self, name: &str) -> bool {
        match EqualizerPreset::parse(name) {
            Some(preset) => {
                self.controller.apply_equalizer_preset(&mut self.engine, preset);
                true
            }
            None => false,
        }
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        self.controller.set_playback_rate(&mut self.engine, rate);
    }

    /// Load decoded interleaved stereo samples and start playing.
    pub fn load_track(&mut self, song_id: &str, interleaved: &[f32], sample_rate: f64) -> bool {
        self.engine.load_track(song_id, interleaved, sample_rate)
    }

    /// Render `frames` interleaved stereo frames.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        self.handle.render(frames)
    }

    pub fn status(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.engine.status()).map_err(js_error)
    }

    pub fn settings(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.controller.settings()).map_err(js_error)
    }

    /// Replace the stored settings (e.g. rehydrated from local storage) and apply them.
    pub fn apply_settings(&mut self, settings: JsValue) -> Result<(), JsValue> {
        let settings: EffectSettings = serde_wasm_bindgen::from_value(settings).map_err(js_error)?;
        self.controller = EffectController::new(settings);
        self.controller.apply_all(&mut self.engine);
        Ok(())
    }
}
