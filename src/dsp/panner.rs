//! Equal-power stereo panner (WebAudio StereoPannerNode, stereo input).

use std::f64::consts::FRAC_PI_2;

/// Pan one stereo frame. `pan` is clamped to [-1, 1]; 0 leaves the frame unchanged.
#[inline]
pub fn pan_frame(pan: f64, left: f64, right: f64) -> (f64, f64) {
    let pan = pan.clamp(-1.0, 1.0);
    if pan <= 0.0 {
        let x = (pan + 1.0) * FRAC_PI_2;
        let (gain_l, gain_r) = (x.cos(), x.sin());
        (left + right * gain_l, right * gain_r)
    } else {
        let x = pan * FRAC_PI_2;
        let (gain_l, gain_r) = (x.cos(), x.sin());
        (left * gain_l, right + left * gain_r)
    }
}
