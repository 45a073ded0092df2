//! Parameter automation: click-free value changes on graph nodes.
//!
//! An [`AudioParam`] holds a resting value plus at most one ramp segment.
//! Scheduling a new ramp anchors it at the parameter's value *now*, so a
//! second change supersedes the first without a jump (last write wins).
//! The render thread samples the param with [`AudioParam::value_at`].

/// Exponential ramps cannot reach or start from zero; targets are floored here.
pub const EXPONENTIAL_FLOOR: f64 = 1e-4;

/// Ramp curve shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampCurve {
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Ramp {
    curve: RampCurve,
    start_time: f64,
    start_value: f64,
    end_time: f64,
    target: f64,
}

/// An automatable node parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioParam {
    value: f64,
    ramp: Option<Ramp>,
    min: f64,
    max: f64,
}

impl AudioParam {
    pub fn new(value: f64) -> Self {
        Self::with_range(value, f64::MIN, f64::MAX)
    }

    /// A param whose values are always clamped to `[min, max]`.
    pub fn with_range(value: f64, min: f64, max: f64) -> Self {
        AudioParam {
            value: value.clamp(min, max),
            ramp: None,
            min,
            max,
        }
    }

    /// Write a value immediately, cancelling any scheduled ramp.
    pub fn set_value(&mut self, value: f64) {
        self.ramp = None;
        self.value = value.clamp(self.min, self.max);
    }

    /// The value the param is heading to (its resting value once any ramp ends).
    pub fn target(&self) -> f64 {
        self.ramp.map_or(self.value, |r| r.target)
    }

    pub fn is_ramping_at(&self, time: f64) -> bool {
        self.ramp.is_some_and(|r| time < r.end_time)
    }

    /// Evaluate the param at `time` (seconds on the context clock).
    pub fn value_at(&self, time: f64) -> f64 {
        let Some(ramp) = self.ramp else {
            return self.value;
        };
        if time >= ramp.end_time {
            return ramp.target;
        }
        if time <= ramp.start_time {
            return ramp.start_value;
        }
        let progress = (time - ramp.start_time) / (ramp.end_time - ramp.start_time);
        match ramp.curve {
            RampCurve::Linear => ramp.start_value + (ramp.target - ramp.start_value) * progress,
            RampCurve::Exponential => {
                ramp.start_value * (ramp.target / ramp.start_value).powf(progress)
            }
        }
    }

    /// Ramp from the current value (at `now`) to `target` over `duration` seconds.
    ///
    /// A zero duration behaves like [`AudioParam::set_value`].
    pub fn ramp_to(&mut self, curve: RampCurve, target: f64, now: f64, duration: f64) {
        let mut target = target.clamp(self.min, self.max);
        let mut start_value = self.value_at(now);
        if curve == RampCurve::Exponential {
            target = floor_positive(target);
            start_value = floor_positive(start_value);
        }
        if duration.is_nan() || duration <= 0.0 {
            self.set_value(target);
            return;
        }
        self.value = target;
        self.ramp = Some(Ramp {
            curve,
            start_time: now,
            start_value,
            end_time: now + duration,
            target,
        });
    }

    /// Drop a finished ramp so later evaluations take the fast path.
    pub fn settle(&mut self, time: f64) {
        if let Some(ramp) = self.ramp {
            if time >= ramp.end_time {
                self.value = ramp.target;
                self.ramp = None;
            }
        }
    }
}

#[inline]
fn floor_positive(value: f64) -> f64 {
    if value < EXPONENTIAL_FLOOR {
        EXPONENTIAL_FLOOR
    } else {
        value
    }
}

/// Issues ramped parameter changes against the context clock.
///
/// Holds the clock reading for one batch of changes so every param touched by
/// a single effect toggle starts its ramp at the same instant.
#[derive(Debug, Clone, Copy)]
pub struct ParamAutomator {
    now: f64,
}

impl ParamAutomator {
    pub fn at(now: f64) -> Self {
        ParamAutomator { now }
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn linear(&self, param: &mut AudioParam, target: f64, duration: f64) {
        param.ramp_to(RampCurve::Linear, target, self.now, duration);
    }

    /// Exponential ramp; a target of 0 is replaced by [`EXPONENTIAL_FLOOR`].
    pub fn exponential(&self, param: &mut AudioParam, target: f64, duration: f64) {
        param.ramp_to(RampCurve::Exponential, target, self.now, duration);
    }

    pub fn set(&self, param: &mut AudioParam, value: f64) {
        param.set_value(value);
    }
}
