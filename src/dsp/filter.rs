//! Biquad filter — matches WebAudio BiquadFilterNode coefficients.

use std::f64::consts::PI;

/// Filter type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterType {
    Lowpass,
    Highpass,
    Peaking,
    Lowshelf,
    Highshelf,
}

/// A biquad IIR filter (2nd order).
///
/// Implements the standard Direct Form II Transposed structure.
/// Coefficient formulas from the Audio EQ Cookbook (Robert Bristow-Johnson),
/// with the WebAudio conventions: lowpass and highpass Q is a resonance in dB,
/// and a lowpass at or above Nyquist or a highpass at or below 0 Hz passes the
/// signal unchanged.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    pub filter_type: FilterType,
    pub frequency: f64,
    pub q: f64, // dB for lowpass/highpass
    pub gain_db: f64, // peaking and shelves only

    // Coefficients
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    // State (Direct Form II Transposed)
    z1: f64,
    z2: f64,

    sample_rate: f64,
    dirty: bool,
}

impl BiquadFilter {
    pub fn new(filter_type: FilterType, sample_rate: f64) -> Self {
        let mut f = BiquadFilter {
            filter_type,
            frequency: 350.0,
            q: 1.0,
            gain_db: 0.0,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
            dirty: true,
        };
        f.update_coefficients();
        f
    }

    /// Recompute filter coefficients from current parameters.
    pub fn update_coefficients(&mut self) {
        self.dirty = false;
        let nyquist = self.sample_rate / 2.0;
        let normalized = (self.frequency / nyquist).clamp(0.0, 1.0);

        match self.filter_type {
            FilterType::Lowpass if normalized >= 1.0 => return self.set_identity(),
            FilterType::Highpass if normalized <= 0.0 => return self.set_identity(),
            FilterType::Lowpass | FilterType::Highpass if normalized <= 0.0 || normalized >= 1.0 => {
                // Lowpass at DC / highpass at Nyquist: everything is rejected.
                return self.set_coefficients(0.0, 0.0, 0.0, 1.0, 0.0, 0.0);
            }
            FilterType::Peaking | FilterType::Lowshelf | FilterType::Highshelf
                if normalized <= 0.0 || normalized >= 1.0 =>
            {
                // A shelf or peak pinned to an edge degenerates to a flat gain.
                let a = 10.0_f64.powf(self.gain_db / 20.0);
                let flat = match self.filter_type {
                    FilterType::Lowshelf if normalized >= 1.0 => a,
                    FilterType::Highshelf if normalized <= 0.0 => a,
                    _ => 1.0,
                };
                return self.set_coefficients(flat, 0.0, 0.0, 1.0, 0.0, 0.0);
            }
            _ => {}
        }

        let w0 = PI * normalized;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let q = match self.filter_type {
            FilterType::Lowpass | FilterType::Highpass => 10.0_f64.powf(self.q / 20.0),
            _ => self.q.max(1e-4),
        };
        let alpha = sin_w0 / (2.0 * q);
        let a_lin = (10.0_f64).powf(self.gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match self.filter_type {
            FilterType::Lowpass => {
                let b1 = 1.0 - cos_w0;
                let b0 = b1 / 2.0;
                let b2 = b0;
                let a0 = 1.0 + alpha;
                let a1 = -2.0 * cos_w0;
                let a2 = 1.0 - alpha;
                (b0, b1, b2, a0, a1, a2)
            }
            FilterType::Highpass => {
                let b1_raw = 1.0 + cos_w0;
                let b0 = b1_raw / 2.0;
                let b1 = -(1.0 + cos_w0);
                let b2 = b0;
                let a0 = 1.0 + alpha;
                let a1 = -2.0 * cos_w0;
                let a2 = 1.0 - alpha;
                (b0, b1, b2, a0, a1, a2)
            }
            FilterType::Peaking => {
                let b0 = 1.0 + alpha * a_lin;
                let b1 = -2.0 * cos_w0;
                let b2 = 1.0 - alpha * a_lin;
                let a0 = 1.0 + alpha / a_lin;
                let a1 = -2.0 * cos_w0;
                let a2 = 1.0 - alpha / a_lin;
                (b0, b1, b2, a0, a1, a2)
            }
            FilterType::Lowshelf | FilterType::Highshelf => {
                // Shelf slope S = 1, as WebAudio does (Q is ignored).
                let alpha = sin_w0 / 2.0 * 2.0_f64.sqrt();
                let k = 2.0 * a_lin.sqrt() * alpha;
                let ap1 = a_lin + 1.0;
                let am1 = a_lin - 1.0;
                if self.filter_type == FilterType::Lowshelf {
                    (
                        a_lin * (ap1 - am1 * cos_w0 + k),
                        2.0 * a_lin * (am1 - ap1 * cos_w0),
                        a_lin * (ap1 - am1 * cos_w0 - k),
                        ap1 + am1 * cos_w0 + k,
                        -2.0 * (am1 + ap1 * cos_w0),
                        ap1 + am1 * cos_w0 - k,
                    )
                } else {
                    (
                        a_lin * (ap1 + am1 * cos_w0 + k),
                        -2.0 * a_lin * (am1 + ap1 * cos_w0),
                        a_lin * (ap1 + am1 * cos_w0 - k),
                        ap1 - am1 * cos_w0 + k,
                        2.0 * (am1 - ap1 * cos_w0),
                        ap1 - am1 * cos_w0 - k,
                    )
                }
            }
        };

        self.set_coefficients(b0, b1, b2, a0, a1, a2);
    }

    fn set_identity(&mut self) {
        self.set_coefficients(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);
    }

    fn set_coefficients(&mut self, b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) {
        // Normalize by a0
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    /// Process a single sample through the filter.
    pub fn process(&mut self, input: f64) -> f64 {
        if self.dirty {
            self.update_coefficients();
        }

        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    /// Set frequency and mark coefficients dirty.
    pub fn set_frequency(&mut self, freq: f64) {
        if freq != self.frequency {
            self.frequency = freq;
            self.dirty = true;
        }
    }

    /// Set Q and mark coefficients dirty.
    pub fn set_q(&mut self, q: f64) {
        if q != self.q {
            self.q = q;
            self.dirty = true;
        }
    }

    /// Set gain (dB) and mark coefficients dirty.
    pub fn set_gain_db(&mut self, gain_db: f64) {
        if gain_db != self.gain_db {
            self.gain_db = gain_db;
            self.dirty = true;
        }
    }

    /// Magnitude response at `freq` Hz, computed from the current coefficients.
    pub fn magnitude_at(&mut self, freq: f64) -> f64 {
        if self.dirty {
            self.update_coefficients();
        }
        let w = 2.0 * PI * freq / self.sample_rate;
        let (cos1, sin1) = (w.cos(), w.sin());
        let (cos2, sin2) = ((2.0 * w).cos(), (2.0 * w).sin());
        let num_re = self.b0 + self.b1 * cos1 + self.b2 * cos2;
        let num_im = -(self.b1 * sin1 + self.b2 * sin2);
        let den_re = 1.0 + self.a1 * cos1 + self.a2 * cos2;
        let den_im = -(self.a1 * sin1 + self.a2 * sin2);
        (num_re.hypot(num_im)) / (den_re.hypot(den_im))
    }
}

/// Two independent filter channels sharing the same parameters.
#[derive(Debug, Clone)]
pub struct StereoBiquad {
    left: BiquadFilter,
    right: BiquadFilter,
}

impl StereoBiquad {
    pub fn new(filter_type: FilterType, sample_rate: f64) -> Self {
        let filter = BiquadFilter::new(filter_type, sample_rate);
        StereoBiquad {
            left: filter.clone(),
            right: filter,
        }
    }

    /// Apply parameters to both channels; coefficients are recomputed lazily.
    pub fn configure(&mut self, frequency: f64, q: f64, gain_db: f64) {
        for f in [&mut self.left, &mut self.right] {
            f.set_frequency(frequency);
            f.set_q(q);
            f.set_gain_db(gain_db);
        }
    }

    pub fn process_block(&mut self, left: &mut [f64], right: &mut [f64]) {
        for s in left.iter_mut() {
            *s = self.left.process(*s);
        }
        for s in right.iter_mut() {
            *s = self.right.process(*s);
        }
    }

    pub fn filter(&self) -> &BiquadFilter {
        &self.left
    }
}
