//! Wave shaper: static nonlinear transfer curve.
//!
//! Mirrors the WebAudio WaveShaperNode: the input range [-1, 1] is mapped
//! across the curve table and linearly interpolated. Without a curve the
//! shaper is transparent.

use std::f64::consts::PI;

#[derive(Debug, Clone, Default)]
pub struct WaveShaper {
    curve: Option<Vec<f64>>,
}

impl WaveShaper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a transfer curve. Curves shorter than two points clear the shaper.
    pub fn set_curve(&mut self, curve: Option<Vec<f64>>) {
        self.curve = curve.filter(|c| c.len() >= 2);
    }

    pub fn has_curve(&self) -> bool {
        self.curve.is_some()
    }

    #[inline]
    pub fn process(&self, input: f64) -> f64 {
        let Some(curve) = &self.curve else {
            return input;
        };
        let last = (curve.len() - 1) as f64;
        let pos = ((input.clamp(-1.0, 1.0) + 1.0) * 0.5) * last;
        let index = pos.floor() as usize;
        if index as f64 >= last {
            return curve[curve.len() - 1];
        }
        let frac = pos - index as f64;
        curve[index] + (curve[index + 1] - curve[index]) * frac
    }

    pub fn process_block(&self, left: &mut [f64], right: &mut [f64]) {
        if self.curve.is_none() {
            return;
        }
        for s in left.iter_mut().chain(right.iter_mut()) {
            *s = self.process(*s);
        }
    }
}

/// Soft-saturation curve, `((3 + k) * x * 20°) / (π + k·|x|)`.
///
/// `amount` (k) controls the drive; small values give mild harmonic colour.
pub fn distortion_curve(amount: f64, samples: usize) -> Vec<f64> {
    let samples = samples.max(2);
    let deg = PI / 180.0;
    (0..samples)
        .map(|i| {
            let x = i as f64 * 2.0 / (samples - 1) as f64 - 1.0;
            (3.0 + amount) * x * 20.0 * deg / (PI + amount * x.abs())
        })
        .collect()
}
