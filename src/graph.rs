//! Signal graph: the fixed effect chain, built once per engine.
//!
//! ```text
//! source ─► EQ ×6 ─► spatial LP ─► 8D panner ─┬─► degrade HP ─► degrade LP ─► shaper ─► bass shelf ─► master ─┐
//!                                 ▲           │                                                                ├─► output
//!                          LFO ─► depth       └─► reverb send ─► convolver ────────────────────────────────────┘
//! ```
//!
//! Nodes are created in [`SignalGraph::build`] and never replaced; effects
//! only move their parameters. The graph keeps the context clock: every
//! processed quantum advances it by `quantum / sample_rate` seconds.

use serde::Serialize;

use crate::automation::{AudioParam, ParamAutomator};
use crate::config::{EngineConfig, EQ_BAND_COUNT};
use crate::dsp::convolver::{Convolver, ImpulseResponse};
use crate::dsp::filter::{FilterType, StereoBiquad};
use crate::dsp::mixer::Mixer;
use crate::dsp::oscillator::Oscillator;
use crate::dsp::panner::pan_frame;
use crate::dsp::shaper::WaveShaper;
use crate::equalizer::band_layout;
use crate::error::{EngineError, EngineResult};

/// A biquad node: stereo filter state plus its automatable parameters.
#[derive(Debug, Clone)]
pub struct BiquadNode {
    filter: StereoBiquad,
    pub frequency: AudioParam,
    pub q: AudioParam,
    pub gain: AudioParam,
}

impl BiquadNode {
    fn new(filter_type: FilterType, sample_rate: f64, frequency: f64, q: f64) -> Self {
        let nyquist = sample_rate / 2.0;
        let mut node = BiquadNode {
            filter: StereoBiquad::new(filter_type, sample_rate),
            frequency: AudioParam::with_range(frequency, 0.0, nyquist),
            q: AudioParam::with_range(q, 1e-4, 1000.0),
            gain: AudioParam::with_range(0.0, -40.0, 40.0),
        };
        node.filter.configure(frequency, q, 0.0);
        node
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter.filter().filter_type
    }

    /// Filter one quantum with parameters sampled at `time` (k-rate).
    fn process(&mut self, time: f64, left: &mut [f64], right: &mut [f64]) {
        self.filter.configure(
            self.frequency.value_at(time),
            self.q.value_at(time),
            self.gain.value_at(time),
        );
        self.filter.process_block(left, right);
    }

    fn settle(&mut self, time: f64) {
        self.frequency.settle(time);
        self.q.settle(time);
        self.gain.settle(time);
    }
}

/// Parameter values read from the graph at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphSnapshot {
    pub time: f64,
    pub eq_gains_db: [f64; EQ_BAND_COUNT],
    pub spatial_cutoff_hz: f64,
    pub pan_depth: f64,
    pub rotation_hz: f64,
    pub degrade_highpass_hz: f64,
    pub degrade_lowpass_hz: f64,
    pub distortion: bool,
    pub bass_boost_db: f64,
    pub master_gain: f64,
    pub reverb_send: f64,
}

pub struct SignalGraph {
    sample_rate: f64,
    quantum: usize,
    frames: u64,

    pub(crate) equalizer: Vec<BiquadNode>,
    pub(crate) spatial: BiquadNode,
    pub(crate) lfo: Oscillator,
    pub(crate) lfo_frequency: AudioParam,
    /// Gain between the LFO and the panner's pan input; 0 keeps 8D inert.
    pub(crate) pan_depth: AudioParam,
    pub(crate) degrade_highpass: BiquadNode,
    pub(crate) degrade_lowpass: BiquadNode,
    pub(crate) shaper: WaveShaper,
    pub(crate) bass_boost: BiquadNode,
    pub(crate) master: AudioParam,
    pub(crate) reverb_send: AudioParam,
    convolver: Convolver,

    send_left: Vec<f64>,
    send_right: Vec<f64>,
    mixer: Mixer,
}

impl SignalGraph {
    /// Create every node, wired in its final order, with all effects inert.
    pub fn build(config: &EngineConfig, sample_rate: f64) -> EngineResult<Self> {
        if !(sample_rate.is_finite() && sample_rate >= 8000.0) {
            return Err(EngineError::SubsystemUnavailable(format!(
                "unusable sample rate {sample_rate}"
            )));
        }
        config.validate()?;

        let quantum = config.render_quantum;
        let nyquist = sample_rate / 2.0;

        let equalizer = band_layout(config)
            .iter()
            .map(|band| {
                BiquadNode::new(band.filter_type, sample_rate, band.frequency.min(nyquist), band.q)
            })
            .collect();

        let spatial = BiquadNode::new(FilterType::Lowpass, sample_rate, nyquist, 1.0);

        let mut lfo = Oscillator::new(sample_rate);
        let rotation_hz = 1.0 / config.rotation_period;
        lfo.frequency = rotation_hz;
        lfo.start();

        let degrade_highpass = BiquadNode::new(
            FilterType::Highpass,
            sample_rate,
            config.degradation_off_highpass_hz,
            config.degradation_off_q,
        );
        let degrade_lowpass =
            BiquadNode::new(FilterType::Lowpass, sample_rate, nyquist, config.degradation_off_q);
        let bass_boost = BiquadNode::new(FilterType::Lowshelf, sample_rate, config.bass_boost_hz, 1.0);

        let response = ImpulseResponse::decaying_noise(
            sample_rate,
            config.reverb_seconds,
            config.reverb_decay,
            config.reverb_seed,
        )
        .normalized(sample_rate);
        let convolver = Convolver::new(&response, quantum);

        Ok(SignalGraph {
            sample_rate,
            quantum,
            frames: 0,
            equalizer,
            spatial,
            lfo,
            lfo_frequency: AudioParam::with_range(rotation_hz, 0.0, 20.0),
            pan_depth: AudioParam::with_range(0.0, 0.0, 1.0),
            degrade_highpass,
            degrade_lowpass,
            shaper: WaveShaper::new(),
            bass_boost,
            master: AudioParam::with_range(1.0, 0.0, 4.0),
            reverb_send: AudioParam::with_range(0.0, 0.0, 2.0),
            convolver,
            send_left: vec![0.0; quantum],
            send_right: vec![0.0; quantum],
            mixer: Mixer::new(quantum),
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn nyquist(&self) -> f64 {
        self.sample_rate / 2.0
    }

    pub fn quantum(&self) -> usize {
        self.quantum
    }

    /// Context clock in seconds.
    pub fn current_time(&self) -> f64 {
        self.frames as f64 / self.sample_rate
    }

    /// An automator reading the clock now.
    pub fn automator(&self) -> ParamAutomator {
        ParamAutomator::at(self.current_time())
    }

    pub fn lfo_running(&self) -> bool {
        self.lfo.is_started()
    }

    /// Process one render quantum in place. Both slices must be `quantum()` long.
    pub fn process(&mut self, left: &mut [f64], right: &mut [f64]) {
        debug_assert_eq!(left.len(), self.quantum);
        debug_assert_eq!(right.len(), self.quantum);

        let t0 = self.current_time();
        let dt = 1.0 / self.sample_rate;

        for band in &mut self.equalizer {
            band.process(t0, left, right);
        }
        self.spatial.process(t0, left, right);

        // 8D: LFO scaled by depth drives the pan position (a-rate).
        self.lfo.frequency = self.lfo_frequency.value_at(t0);
        for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
            let depth = self.pan_depth.value_at(t0 + i as f64 * dt);
            let pan = self.lfo.next_sample() * depth;
            (*l, *r) = pan_frame(pan, *l, *r);
        }

        // Reverb tap after the panner.
        for (i, (sl, sr)) in self.send_left.iter_mut().zip(self.send_right.iter_mut()).enumerate() {
            let send = self.reverb_send.value_at(t0 + i as f64 * dt);
            *sl = left[i] * send;
            *sr = right[i] * send;
        }

        self.degrade_highpass.process(t0, left, right);
        self.degrade_lowpass.process(t0, left, right);
        self.shaper.process_block(left, right);
        self.bass_boost.process(t0, left, right);
        for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
            let gain = self.master.value_at(t0 + i as f64 * dt);
            *l *= gain;
            *r *= gain;
        }

        self.convolver.process_block(&mut self.send_left, &mut self.send_right);

        self.mixer.clear(self.quantum);
        self.mixer.add(left, right);
        self.mixer.add(&self.send_left, &self.send_right);
        left.copy_from_slice(self.mixer.left());
        right.copy_from_slice(self.mixer.right());

        self.frames += self.quantum as u64;
        self.settle();
    }

    fn settle(&mut self) {
        let t = self.current_time();
        for band in &mut self.equalizer {
            band.settle(t);
        }
        self.spatial.settle(t);
        self.degrade_highpass.settle(t);
        self.degrade_lowpass.settle(t);
        self.bass_boost.settle(t);
        self.lfo_frequency.settle(t);
        self.pan_depth.settle(t);
        self.master.settle(t);
        self.reverb_send.settle(t);
    }

    /// Parameter values at the current clock.
    pub fn snapshot(&self) -> GraphSnapshot {
        self.snapshot_at(self.current_time())
    }

    /// Parameter values once every scheduled ramp has finished.
    pub fn targets(&self) -> GraphSnapshot {
        self.snapshot_at(f64::INFINITY)
    }

    pub fn snapshot_at(&self, time: f64) -> GraphSnapshot {
        GraphSnapshot {
            time,
            eq_gains_db: std::array::from_fn(|i| {
                self.equalizer.get(i).map_or(0.0, |band| band.gain.value_at(time))
            }),
            spatial_cutoff_hz: self.spatial.frequency.value_at(time),
            pan_depth: self.pan_depth.value_at(time),
            rotation_hz: self.lfo_frequency.value_at(time),
            degrade_highpass_hz: self.degrade_highpass.frequency.value_at(time),
            degrade_lowpass_hz: self.degrade_lowpass.frequency.value_at(time),
            distortion: self.shaper.has_curve(),
            bass_boost_db: self.bass_boost.gain.value_at(time),
            master_gain: self.master.value_at(time),
            reverb_send: self.reverb_send.value_at(time),
        }
    }
}
