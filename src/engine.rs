//! Audio engine: builds the graph once and applies effect changes to it.
//!
//! Every effect setter is fire-and-forget. Before [`AudioEngine::initialize`]
//! succeeds there is no graph, and setters return without touching anything;
//! hosts replay their stored settings after initialization (see
//! [`crate::controller::EffectController::apply_all`]).
//!
//! Rate and pitch preservation live on the media source rather than the
//! graph, so they are accepted at any time.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::config::{BandLimit, EngineConfig, EQ_BAND_COUNT};
use crate::context::{AudioBackend, AudioContext, ContextState};
use crate::dsp::shaper::distortion_curve;
use crate::effects::{DegradationMode, EffectState};
use crate::equalizer::{clamp_gain, EqualizerPreset};
use crate::error::EngineResult;
use crate::graph::{GraphSnapshot, SignalGraph};
use crate::render::{lock, Renderer, SharedGraph};
use crate::source::{
    BufferedSource, SharedSource, SourceFlags, MAX_PLAYBACK_RATE, MIN_PLAYBACK_RATE,
};

/// Table size of the retro saturation curve.
const DISTORTION_CURVE_SAMPLES: usize = 4096;

/// Read-only view for the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub initialized: bool,
    pub context_state: Option<ContextState>,
    pub current_song_id: Option<String>,
    pub current_time: f64,
    pub playback_rate: f64,
    pub effects: EffectState,
    pub reverb_send: f64,
}

pub struct AudioEngine<B: AudioBackend> {
    backend: B,
    config: EngineConfig,
    context: Option<Box<dyn AudioContext>>,
    graph: Option<SharedGraph>,
    source: Option<SharedSource>,
    /// Set when the source is the engine's own [`BufferedSource`].
    buffered: Option<Arc<Mutex<BufferedSource>>>,
    flags: Arc<SourceFlags>,
    effects: EffectState,
    current_song_id: Option<String>,
    graph_builds: usize,
}

impl<B: AudioBackend> AudioEngine<B> {
    pub fn new(backend: B, config: EngineConfig) -> Self {
        let effects = EffectState::new(&config);
        AudioEngine {
            backend,
            config,
            context: None,
            graph: None,
            source: None,
            buffered: None,
            flags: Arc::new(SourceFlags::new()),
            effects,
            current_song_id: None,
            graph_builds: 0,
        }
    }

    /// Use a host-provided media source instead of the default buffered one.
    pub fn with_source(mut self, source: SharedSource) -> Self {
        self.source = Some(source);
        self.buffered = None;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.graph.is_some()
    }

    /// How many times a graph has been built. Never exceeds 1.
    pub fn graph_builds(&self) -> usize {
        self.graph_builds
    }

    /// The media source, created on first access.
    pub fn source(&mut self) -> SharedSource {
        if let Some(source) = &self.source {
            return source.clone();
        }
        let buffered = Arc::new(Mutex::new(BufferedSource::new(self.config.sample_rate)));
        let source: SharedSource = buffered.clone();
        self.buffered = Some(buffered);
        self.source = Some(source.clone());
        log::debug!("Created default media source");
        source
    }

    /// The default buffered source, if the engine owns one.
    pub fn buffered_source(&mut self) -> Option<Arc<Mutex<BufferedSource>>> {
        self.source();
        self.buffered.clone()
    }

    /// Open the audio subsystem and build the graph. A no-op once built.
    ///
    /// On failure nothing is kept; the caller may try again later.
    pub fn initialize(&mut self) -> EngineResult<()> {
        if self.graph.is_some() {
            log::debug!("Audio graph already built; ignoring initialize");
            return Ok(());
        }
        self.build().inspect_err(|e| {
            log::error!("Audio engine initialization failed: {}", e);
        })
    }

    fn build(&mut self) -> EngineResult<()> {
        let source = self.source();
        let mut context = self.backend.open(&self.config)?;
        let sample_rate = context.sample_rate();

        let graph = match SignalGraph::build(&self.config, sample_rate) {
            Ok(graph) => Arc::new(Mutex::new(graph)),
            Err(e) => {
                context.close();
                return Err(e);
            }
        };

        if let Some(buffered) = &self.buffered {
            lock(buffered).set_output_rate(sample_rate);
        }
        self.flags.apply(&mut *lock(&source));

        let renderer = Renderer::new(graph.clone(), source, self.flags.clone());
        if let Err(e) = context.attach(renderer) {
            context.close();
            return Err(e);
        }

        log::info!(
            "Audio graph built: {}Hz, {}-frame quantum, context {:?}",
            sample_rate,
            self.config.render_quantum,
            context.state()
        );
        self.graph_builds += 1;
        self.graph = Some(graph);
        self.context = Some(context);
        Ok(())
    }

    /// Unsuspend the audio subsystem. Only acts on a suspended context.
    pub fn resume_context(&mut self) -> EngineResult<ContextState> {
        let Some(context) = self.context.as_mut() else {
            log::debug!("resume_context before initialize");
            return Ok(ContextState::Suspended);
        };
        let state = context.state();
        if state != ContextState::Suspended {
            return Ok(state);
        }
        context.resume().inspect_err(|e| {
            log::error!("Failed to resume audio context: {}", e);
        })
    }

    pub fn context_state(&self) -> Option<ContextState> {
        self.context.as_ref().map(|c| c.state())
    }

    /// Context clock in seconds; 0 before initialization.
    pub fn current_time(&self) -> f64 {
        self.graph.as_ref().map_or(0.0, |g| lock(g).current_time())
    }

    /// Parameter values at the current clock.
    pub fn snapshot(&self) -> Option<GraphSnapshot> {
        self.graph.as_ref().map(|g| lock(g).snapshot())
    }

    /// Parameter values once all scheduled ramps complete.
    pub fn targets(&self) -> Option<GraphSnapshot> {
        self.graph.as_ref().map(|g| lock(g).targets())
    }

    pub fn effects(&self) -> &EffectState {
        &self.effects
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            initialized: self.is_initialized(),
            context_state: self.context_state(),
            current_song_id: self.current_song_id.clone(),
            current_time: self.current_time(),
            playback_rate: self.flags.playback_rate(),
            effects: self.effects.clone(),
            reverb_send: self.effects.reverb_send(&self.config),
        }
    }

    pub fn current_song_id(&self) -> Option<&str> {
        self.current_song_id.as_deref()
    }

    pub fn set_current_song_id(&mut self, song_id: Option<String>) {
        self.current_song_id = song_id;
    }

    // --- effects ---

    pub fn set_spatial_mode(&mut self, enabled: bool) {
        let Some(shared) = &self.graph else { return };
        let mut graph = lock(shared);
        let cutoff = if enabled {
            self.config.spatial_cutoff_hz
        } else {
            graph.nyquist()
        };
        let automator = graph.automator();
        automator.exponential(&mut graph.spatial.frequency, cutoff, self.config.ramps.spatial);
        self.effects.spatial = enabled;
        log::debug!("Spatial {} (cutoff {}Hz)", on_off(enabled), cutoff);
        update_reverb_send(&mut graph, &self.effects, &self.config);
    }

    /// Reverb input only; rate and pitch are the caller's to coordinate.
    pub fn set_slowed_reverb_mode(&mut self, enabled: bool) {
        let Some(shared) = &self.graph else { return };
        let mut graph = lock(shared);
        self.effects.slowed_reverb = enabled;
        log::debug!("Slowed+Reverb {}", on_off(enabled));
        update_reverb_send(&mut graph, &self.effects, &self.config);
    }

    /// Enable or disable 8D panning. The period only applies when enabling.
    pub fn set_8d_audio_mode(&mut self, enabled: bool, rotation_period: f64) {
        let Some(shared) = &self.graph else { return };
        if enabled && !valid_period(rotation_period) {
            log::warn!("Ignoring 8D rotation period {}", rotation_period);
            return;
        }
        let mut graph = lock(shared);
        let automator = graph.automator();
        let depth = if enabled { 1.0 } else { 0.0 };
        automator.linear(&mut graph.pan_depth, depth, self.config.ramps.pan_depth);
        if enabled {
            automator.set(&mut graph.lfo_frequency, 1.0 / rotation_period);
            self.effects.rotation_period = rotation_period;
        }
        self.effects.eight_d = enabled;
        log::debug!("8D {} (period {}s)", on_off(enabled), self.effects.rotation_period);
    }

    /// Change rotation speed. Ignored while 8D is off.
    pub fn set_8d_rotation_speed(&mut self, rotation_period: f64) {
        let Some(shared) = &self.graph else { return };
        if !self.effects.eight_d {
            return;
        }
        if !valid_period(rotation_period) {
            log::warn!("Ignoring 8D rotation period {}", rotation_period);
            return;
        }
        let mut graph = lock(shared);
        let automator = graph.automator();
        automator.linear(
            &mut graph.lfo_frequency,
            1.0 / rotation_period,
            self.config.ramps.rotation,
        );
        self.effects.rotation_period = rotation_period;
    }

    /// Select the band-limiting variant, or turn it off.
    pub fn set_degradation(&mut self, mode: DegradationMode) {
        let Some(shared) = &self.graph else { return };
        let mut graph = lock(shared);
        let limit = match mode {
            DegradationMode::Off => BandLimit {
                highpass_hz: self.config.degradation_off_highpass_hz,
                highpass_q: self.config.degradation_off_q,
                lowpass_hz: graph.nyquist(),
                lowpass_q: self.config.degradation_off_q,
            },
            DegradationMode::LoFi => self.config.lofi,
            DegradationMode::Retro => self.config.retro,
        };
        let ramp = self.config.ramps.degradation;
        let automator = graph.automator();
        automator.exponential(&mut graph.degrade_highpass.frequency, limit.highpass_hz, ramp);
        automator.set(&mut graph.degrade_highpass.q, limit.highpass_q);
        automator.exponential(&mut graph.degrade_lowpass.frequency, limit.lowpass_hz, ramp);
        automator.set(&mut graph.degrade_lowpass.q, limit.lowpass_q);

        let curve = mode
            .has_distortion()
            .then(|| distortion_curve(self.config.retro_drive, DISTORTION_CURVE_SAMPLES));
        graph.shaper.set_curve(curve);

        self.effects.degradation = mode;
        log::debug!("Degradation {:?}", mode);
    }

    pub fn set_lofi_mode(&mut self, enabled: bool) {
        self.toggle_degradation(DegradationMode::LoFi, enabled);
    }

    pub fn set_retro_mode(&mut self, enabled: bool) {
        self.toggle_degradation(DegradationMode::Retro, enabled);
    }

    fn toggle_degradation(&mut self, variant: DegradationMode, enabled: bool) {
        if enabled {
            self.set_degradation(variant);
        } else if self.effects.degradation == variant {
            self.set_degradation(DegradationMode::Off);
        }
    }

    pub fn set_bass_boost_mode(&mut self, enabled: bool) {
        let Some(shared) = &self.graph else { return };
        let mut graph = lock(shared);
        let gain = if enabled { self.config.bass_boost_db } else { 0.0 };
        let automator = graph.automator();
        automator.linear(&mut graph.bass_boost.gain, gain, self.config.ramps.bass_boost);
        self.effects.bass_boost = enabled;
        log::debug!("Bass boost {} ({}dB)", on_off(enabled), gain);
    }

    // --- equalizer ---

    /// Master switch. Stored band gains are kept while off.
    pub fn set_equalizer_enabled(&mut self, enabled: bool) {
        let Some(shared) = &self.graph else { return };
        let mut graph = lock(shared);
        self.effects.equalizer.enabled = enabled;
        for (band, node) in graph.equalizer.iter_mut().enumerate() {
            node.gain.set_value(self.effects.equalizer.effective_gain(band));
        }
    }

    pub fn set_equalizer_band(&mut self, band: usize, gain_db: f64) {
        let Some(shared) = &self.graph else { return };
        if band >= EQ_BAND_COUNT {
            log::warn!("Equalizer band {} out of range", band);
            return;
        }
        let mut graph = lock(shared);
        self.effects.equalizer.gains_db[band] = clamp_gain(gain_db, &self.config);
        let gain = self.effects.equalizer.effective_gain(band);
        if let Some(node) = graph.equalizer.get_mut(band) {
            node.gain.set_value(gain);
        }
    }

    pub fn set_equalizer_bands(&mut self, gains_db: &[f64]) {
        if gains_db.len() != EQ_BAND_COUNT {
            log::warn!(
                "Expected {} equalizer gains, got {}",
                EQ_BAND_COUNT,
                gains_db.len()
            );
        }
        for (band, &gain) in gains_db.iter().take(EQ_BAND_COUNT).enumerate() {
            self.set_equalizer_band(band, gain);
        }
    }

    pub fn apply_equalizer_preset(&mut self, preset: EqualizerPreset) {
        self.set_equalizer_bands(&preset.gains());
    }

    // --- media source ---

    pub fn playback_rate(&self) -> f64 {
        self.flags.playback_rate()
    }

    /// Set the source's playback rate, clamped to the supported range.
    pub fn set_playback_rate(&mut self, rate: f64) {
        if !(rate.is_finite() && rate > 0.0) {
            log::warn!("Ignoring playback rate {}", rate);
            return;
        }
        let rate = rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE);
        self.flags.set_playback_rate(rate);
        let source = self.source();
        lock(&source).set_playback_rate(rate);
    }

    pub fn preserves_pitch(&self) -> bool {
        self.flags.preserves_pitch()
    }

    pub fn set_pitch_preservation(&mut self, preserve: bool) {
        self.flags.set_preserves_pitch(preserve);
        self.effects.preserves_pitch = preserve;
        let source = self.source();
        lock(&source).set_preserves_pitch(preserve);
    }

    /// Reassert rate and pitch preservation if the source's media changed.
    pub fn sync_source(&mut self) -> bool {
        let source = self.source();
        let reasserted = self.flags.reassert(&mut *lock(&source));
        if reasserted {
            log::debug!("Reasserted rate {} and pitch flag on new media", self.flags.playback_rate());
        }
        reasserted
    }

    /// Load decoded stereo frames into the default source and start playing.
    ///
    /// Returns `false` when the host supplied its own source.
    pub fn load_track(&mut self, song_id: &str, interleaved: &[f32], sample_rate: f64) -> bool {
        let Some(buffered) = self.buffered_source() else {
            log::warn!("load_track needs the default buffered source");
            return false;
        };
        {
            let mut source = lock(&buffered);
            source.load(song_id, interleaved, sample_rate);
            source.play();
        }
        self.current_song_id = Some(song_id.to_string());
        self.sync_source();
        true
    }

    /// Decode a WAV file into the default source and start playing.
    #[cfg(feature = "wav")]
    pub fn load_wav_track(&mut self, song_id: &str, bytes: &[u8]) -> EngineResult<bool> {
        let Some(buffered) = self.buffered_source() else {
            log::warn!("load_wav_track needs the default buffered source");
            return Ok(false);
        };
        {
            let mut source = lock(&buffered);
            source.load_wav(song_id, bytes)?;
            source.play();
        }
        self.current_song_id = Some(song_id.to_string());
        self.sync_source();
        Ok(true)
    }
}

/// Ramp the shared reverb send to the level the current effects call for.
fn update_reverb_send(graph: &mut SignalGraph, effects: &EffectState, config: &EngineConfig) {
    let level = effects.reverb_send(config);
    let automator = graph.automator();
    automator.linear(&mut graph.reverb_send, level, config.ramps.reverb_send);
    log::debug!("Reverb send -> {}", level);
}

fn valid_period(seconds: f64) -> bool {
    seconds.is_finite() && seconds > 0.0
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

/// Application-scoped owner of the single engine instance.
pub struct EngineService<B: AudioBackend> {
    factory: Box<dyn Fn() -> AudioEngine<B>>,
    engine: Option<AudioEngine<B>>,
    created: usize,
}

impl<B: AudioBackend> EngineService<B> {
    pub fn new(factory: impl Fn() -> AudioEngine<B> + 'static) -> Self {
        EngineService {
            factory: Box::new(factory),
            engine: None,
            created: 0,
        }
    }

    /// The engine, constructed on first access.
    pub fn instance(&mut self) -> &mut AudioEngine<B> {
        if self.engine.is_none() {
            self.created += 1;
        }
        let factory = &self.factory;
        self.engine.get_or_insert_with(|| factory())
    }

    pub fn get(&self) -> Option<&AudioEngine<B>> {
        self.engine.as_ref()
    }

    /// Drop the engine; the next `instance()` builds a fresh one.
    pub fn reset(&mut self) {
        self.engine = None;
    }

    /// Engines constructed over the service's lifetime.
    pub fn created(&self) -> usize {
        self.created
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{OfflineBackend, OfflineHandle};
    use crate::source::MediaSource;

    fn test_config() -> EngineConfig {
        EngineConfig {
            reverb_seconds: 0.1,
            ..EngineConfig::default()
        }
    }

    fn engine() -> (AudioEngine<OfflineBackend>, OfflineHandle) {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
            .is_test(true)
            .try_init();
        let backend = OfflineBackend::new();
        let handle = backend.handle();
        (AudioEngine::new(backend, test_config()), handle)
    }

    fn running_engine() -> (AudioEngine<OfflineBackend>, OfflineHandle) {
        let (mut engine, handle) = engine();
        engine.initialize().unwrap();
        assert_eq!(engine.resume_context().unwrap(), ContextState::Running);
        (engine, handle)
    }

    fn defaults() -> GraphSnapshot {
        let (engine, _) = running_engine();
        engine.targets().unwrap()
    }

    fn touch_every_setter(engine: &mut AudioEngine<OfflineBackend>) {
        engine.set_spatial_mode(true);
        engine.set_slowed_reverb_mode(true);
        engine.set_8d_audio_mode(true, 2.0);
        engine.set_8d_rotation_speed(8.0);
        engine.set_lofi_mode(true);
        engine.set_retro_mode(true);
        engine.set_bass_boost_mode(true);
        engine.set_equalizer_band(1, 6.0);
        engine.set_equalizer_bands(&[3.0; EQ_BAND_COUNT]);
        engine.set_equalizer_enabled(false);
        engine.apply_equalizer_preset(EqualizerPreset::Loudness);
    }

    #[test]
    fn setters_before_initialize_are_dropped() {
        let (mut engine, handle) = engine();
        touch_every_setter(&mut engine);
        assert!(!engine.is_initialized());
        assert!(engine.targets().is_none());
        assert_eq!(engine.effects(), &EffectState::new(engine.config()));
        assert_eq!(handle.opens(), 0, "Setters must not open the subsystem");

        engine.initialize().unwrap();
        assert_eq!(engine.targets().unwrap(), defaults());
        assert_eq!(engine.status().reverb_send, 0.0);
    }

    #[test]
    fn initialize_twice_builds_once() {
        let (mut engine, handle) = engine();
        engine.initialize().unwrap();
        engine.initialize().unwrap();
        assert!(engine.is_initialized());
        assert_eq!(engine.graph_builds(), 1);
        assert_eq!(handle.opens(), 1);
    }

    #[test]
    fn failed_initialize_leaves_engine_uninitialized_and_retryable() {
        let backend = OfflineBackend::new().failing_opens(1);
        let handle = backend.handle();
        let mut engine = AudioEngine::new(backend, test_config());

        assert!(engine.initialize().is_err());
        assert!(!engine.is_initialized());
        assert_eq!(engine.graph_builds(), 0);
        engine.set_spatial_mode(true);
        assert!(!engine.effects().spatial);

        engine.initialize().unwrap();
        assert!(engine.is_initialized());
        assert_eq!(engine.graph_builds(), 1);
        assert_eq!(handle.opens(), 1);
    }

    #[test]
    fn reverb_priority_sequence() {
        let (mut engine, handle) = running_engine();
        let send = |e: &AudioEngine<OfflineBackend>| e.targets().unwrap().reverb_send;

        engine.set_spatial_mode(true);
        assert_eq!(send(&engine), 0.8);
        engine.set_spatial_mode(false);
        assert_eq!(send(&engine), 0.0);

        engine.set_slowed_reverb_mode(true);
        assert_eq!(send(&engine), 0.6);
        engine.set_spatial_mode(true);
        assert_eq!(send(&engine), 0.8, "Spatial overrides Slowed+Reverb");
        engine.set_spatial_mode(false);
        assert_eq!(send(&engine), 0.6, "Falls back to Slowed+Reverb level");

        handle.advance(0.2);
        assert_eq!(engine.snapshot().unwrap().reverb_send, 0.6);

        engine.set_slowed_reverb_mode(false);
        handle.advance(0.2);
        assert_eq!(engine.snapshot().unwrap().reverb_send, 0.0);
    }

    #[test]
    fn spatial_sweeps_cutoff_with_a_ramp() {
        let (mut engine, handle) = running_engine();
        engine.set_spatial_mode(true);
        assert_eq!(engine.snapshot().unwrap().spatial_cutoff_hz, 22050.0, "No jump on toggle");
        handle.advance(0.1);
        let mid = engine.snapshot().unwrap().spatial_cutoff_hz;
        assert!(mid < 22050.0 && mid > 800.0, "Cutoff should be mid-sweep, got {mid}");
        handle.advance(0.2);
        assert_eq!(engine.snapshot().unwrap().spatial_cutoff_hz, 800.0);

        engine.set_spatial_mode(false);
        handle.advance(0.3);
        assert_eq!(engine.snapshot().unwrap().spatial_cutoff_hz, 22050.0);
    }

    #[test]
    fn eight_d_mode_and_rotation_speed() {
        let (mut engine, handle) = running_engine();
        engine.set_8d_audio_mode(true, 4.0);
        let targets = engine.targets().unwrap();
        assert_eq!(targets.rotation_hz, 0.25);
        assert_eq!(targets.pan_depth, 1.0);
        assert_eq!(engine.snapshot().unwrap().pan_depth, 0.0, "Depth ramps in");
        handle.advance(0.4);
        assert_eq!(engine.snapshot().unwrap().pan_depth, 1.0);

        engine.set_8d_rotation_speed(2.0);
        assert_eq!(engine.targets().unwrap().rotation_hz, 0.5);
        assert_eq!(engine.targets().unwrap().pan_depth, 1.0, "Speed change leaves depth alone");

        engine.set_8d_audio_mode(false, 4.0);
        assert_eq!(engine.targets().unwrap().pan_depth, 0.0);
        assert_eq!(engine.effects().rotation_period, 2.0, "Disable keeps the period");

        engine.set_8d_rotation_speed(8.0);
        assert_eq!(engine.targets().unwrap().rotation_hz, 0.5, "Ignored while disabled");
        assert!(!engine.effects().eight_d, "Speed change must not re-enable 8D");
    }

    #[test]
    fn eight_d_rejects_bad_periods() {
        let (mut engine, _) = running_engine();
        engine.set_8d_audio_mode(true, 0.0);
        assert!(!engine.effects().eight_d);
        engine.set_8d_audio_mode(true, 4.0);
        engine.set_8d_rotation_speed(f64::NAN);
        engine.set_8d_rotation_speed(-1.0);
        assert_eq!(engine.targets().unwrap().rotation_hz, 0.25);
    }

    #[test]
    fn degradation_variants_share_one_slot() {
        let (mut engine, _) = running_engine();
        engine.set_lofi_mode(true);
        let t = engine.targets().unwrap();
        assert_eq!((t.degrade_highpass_hz, t.degrade_lowpass_hz), (500.0, 3000.0));
        assert!(!t.distortion);

        engine.set_retro_mode(true);
        let t = engine.targets().unwrap();
        assert_eq!((t.degrade_highpass_hz, t.degrade_lowpass_hz), (250.0, 4000.0));
        assert!(t.distortion);
        assert_eq!(engine.effects().degradation, DegradationMode::Retro);

        engine.set_lofi_mode(false);
        assert_eq!(engine.effects().degradation, DegradationMode::Retro, "Not the active variant");

        engine.set_retro_mode(false);
        let t = engine.targets().unwrap();
        assert_eq!((t.degrade_highpass_hz, t.degrade_lowpass_hz), (10.0, 22050.0));
        assert!(!t.distortion);
    }

    #[test]
    fn bass_boost_ramps_to_nine_and_back() {
        let (mut engine, handle) = running_engine();
        engine.set_bass_boost_mode(true);
        assert_eq!(engine.targets().unwrap().bass_boost_db, 9.0);
        handle.advance(0.1);
        let mid = engine.snapshot().unwrap().bass_boost_db;
        assert!(mid > 0.0 && mid < 9.0, "Gain should be ramping, got {mid}");
        handle.advance(0.2);
        assert_eq!(engine.snapshot().unwrap().bass_boost_db, 9.0);

        engine.set_bass_boost_mode(false);
        handle.advance(0.3);
        assert_eq!(engine.snapshot().unwrap().bass_boost_db, 0.0);
    }

    #[test]
    fn equalizer_switch_keeps_stored_gains() {
        let (mut engine, _) = running_engine();
        engine.set_equalizer_band(2, 5.0);
        assert_eq!(engine.snapshot().unwrap().eq_gains_db[2], 5.0);

        engine.set_equalizer_enabled(false);
        assert_eq!(engine.snapshot().unwrap().eq_gains_db, [0.0; EQ_BAND_COUNT]);
        assert_eq!(engine.effects().equalizer.gains_db[2], 5.0);

        engine.set_equalizer_band(3, 4.0);
        assert_eq!(engine.snapshot().unwrap().eq_gains_db[3], 0.0, "Switch off masks new gains");

        engine.set_equalizer_enabled(true);
        let gains = engine.snapshot().unwrap().eq_gains_db;
        assert_eq!((gains[2], gains[3]), (5.0, 4.0));
    }

    #[test]
    fn equalizer_clamps_and_ignores_bad_bands() {
        let (mut engine, _) = running_engine();
        engine.set_equalizer_band(0, 30.0);
        engine.set_equalizer_band(EQ_BAND_COUNT, 3.0);
        let gains = engine.snapshot().unwrap().eq_gains_db;
        assert_eq!(gains[0], 12.0);

        engine.apply_equalizer_preset(EqualizerPreset::Treble);
        assert_eq!(engine.snapshot().unwrap().eq_gains_db, EqualizerPreset::Treble.gains());
    }

    #[test]
    fn repeated_calls_do_not_drift() {
        let (mut once, once_handle) = running_engine();
        let (mut twice, twice_handle) = running_engine();

        once.set_spatial_mode(true);
        once.set_8d_audio_mode(true, 4.0);
        once.set_bass_boost_mode(true);
        once.set_lofi_mode(true);

        for _ in 0..2 {
            twice.set_spatial_mode(true);
            twice.set_8d_audio_mode(true, 4.0);
            twice.set_bass_boost_mode(true);
            twice.set_lofi_mode(true);
            twice_handle.advance(0.05);
        }
        once_handle.advance(1.0);
        twice_handle.advance(1.0);

        let mut a = once.snapshot().unwrap();
        let mut b = twice.snapshot().unwrap();
        a.time = 0.0;
        b.time = 0.0;
        assert_eq!(a, b);
        assert_eq!(once.effects(), twice.effects());
    }

    #[test]
    fn resume_context_only_acts_when_suspended() {
        let (mut engine, handle) = engine();
        assert_eq!(engine.resume_context().unwrap(), ContextState::Suspended);
        engine.initialize().unwrap();
        assert_eq!(handle.state(), ContextState::Suspended);
        assert_eq!(engine.resume_context().unwrap(), ContextState::Running);
        assert_eq!(engine.resume_context().unwrap(), ContextState::Running);
    }

    #[test]
    fn refused_resume_is_reported() {
        let mut engine = AudioEngine::new(OfflineBackend::new().refusing_resume(), test_config());
        engine.initialize().unwrap();
        assert!(engine.resume_context().is_err());
        assert_eq!(engine.context_state(), Some(ContextState::Suspended));
    }

    #[test]
    fn suspended_context_holds_the_clock() {
        let (mut engine, handle) = engine();
        engine.initialize().unwrap();
        engine.load_track("song", &vec![0.5; 4096], 44100.0);
        let out = handle.render(512);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(engine.current_time(), 0.0);
    }

    #[test]
    fn rate_and_pitch_survive_track_changes() {
        let (mut engine, _) = running_engine();
        engine.set_playback_rate(0.85);
        engine.set_pitch_preservation(false);

        assert!(engine.load_track("next", &vec![0.0; 256], 44100.0));
        let source = engine.source();
        let source = source.lock().unwrap();
        assert_eq!(source.playback_rate(), 0.85);
        assert!(!source.preserves_pitch());
        drop(source);
        assert_eq!(engine.current_song_id(), Some("next"));
    }

    #[test]
    fn playback_rate_is_clamped() {
        let (mut engine, _) = engine();
        engine.set_playback_rate(10.0);
        assert_eq!(engine.playback_rate(), MAX_PLAYBACK_RATE);
        engine.set_playback_rate(-1.0);
        assert_eq!(engine.playback_rate(), MAX_PLAYBACK_RATE);
    }

    #[test]
    fn custom_source_cannot_load_tracks() {
        let custom: SharedSource = Arc::new(Mutex::new(BufferedSource::new(44100.0)));
        let mut engine = AudioEngine::new(OfflineBackend::new(), test_config()).with_source(custom);
        assert!(!engine.load_track("x", &[0.0; 8], 44100.0));
        assert!(engine.buffered_source().is_none());
    }

    #[test]
    fn loaded_track_reaches_the_output() {
        let (mut engine, handle) = running_engine();
        let tone: Vec<f32> = (0..8192)
            .flat_map(|i| {
                let s = (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin() * 0.5;
                [s, s]
            })
            .collect();
        engine.load_track("tone", &tone, 44100.0);
        let out = handle.render(2048);
        let peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.3, "Expected audible output, peak {peak}");
    }

    #[test]
    fn status_serializes() {
        let (mut engine, _) = running_engine();
        engine.set_current_song_id(Some("abc".to_string()));
        engine.set_spatial_mode(true);
        let json = serde_json::to_value(engine.status()).unwrap();
        assert_eq!(json["initialized"], true);
        assert_eq!(json["context_state"], "running");
        assert_eq!(json["current_song_id"], "abc");
        assert_eq!(json["reverb_send"], 0.8);
        assert_eq!(json["effects"]["spatial"], true);
    }

    #[test]
    fn service_builds_one_engine_until_reset() {
        let mut service = EngineService::new(|| AudioEngine::new(OfflineBackend::new(), test_config()));
        assert!(service.get().is_none());
        service.instance().initialize().unwrap();
        service.instance().set_bass_boost_mode(true);
        assert_eq!(service.created(), 1);
        assert!(service.get().is_some_and(|e| e.effects().bass_boost));

        service.reset();
        assert!(!service.instance().is_initialized());
        assert_eq!(service.created(), 2);
    }
}
