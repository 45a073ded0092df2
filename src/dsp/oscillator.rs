//! Low-frequency sine oscillator for modulation.

use std::f64::consts::PI;

/// A sine oscillator with a continuous phase accumulator.
///
/// Changing `frequency` never resets the phase, so a running modulation
/// sweep keeps its position when the rate changes.
#[derive(Debug, Clone)]
pub struct Oscillator {
    pub frequency: f64,
    phase: f64,
    sample_rate: f64,
    started: bool,
}

impl Oscillator {
    pub fn new(sample_rate: f64) -> Self {
        Oscillator {
            frequency: 440.0,
            phase: 0.0,
            sample_rate,
            started: false,
        }
    }

    /// Start the oscillator. Returns `false` if it was already running.
    pub fn start(&mut self) -> bool {
        if self.started {
            return false;
        }
        self.started = true;
        true
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Generate the next sample. A stopped oscillator outputs silence.
    pub fn next_sample(&mut self) -> f64 {
        if !self.started {
            return 0.0;
        }
        let sample = (2.0 * PI * self.phase).sin();

        self.phase += self.frequency / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }

        sample
    }

    /// Current phase in [0, 1).
    pub fn phase(&self) -> f64 {
        self.phase
    }
}
