//! Mixer: sums the main path and the reverb return into the output sink.

/// A stereo summing bus for one render quantum.
#[derive(Debug, Clone)]
pub struct Mixer {
    left: Vec<f64>,
    right: Vec<f64>,
}

impl Mixer {
    pub fn new(frames: usize) -> Self {
        Mixer {
            left: vec![0.0; frames],
            right: vec![0.0; frames],
        }
    }

    /// Zero the bus, resizing it to `frames`.
    pub fn clear(&mut self, frames: usize) {
        self.left.clear();
        self.left.resize(frames, 0.0);
        self.right.clear();
        self.right.resize(frames, 0.0);
    }

    /// Accumulate a stereo block.
    pub fn add(&mut self, left: &[f64], right: &[f64]) {
        for (acc, s) in self.left.iter_mut().zip(left) {
            *acc += s;
        }
        for (acc, s) in self.right.iter_mut().zip(right) {
            *acc += s;
        }
    }

    pub fn left(&self) -> &[f64] {
        &self.left
    }

    pub fn right(&self) -> &[f64] {
        &self.right
    }
}

/// Write one stereo frame into a device frame of any width.
///
/// Channels beyond the first two are filled with silence; a mono sink
/// receives the average of both sides. Samples are clamped to [-1, 1].
pub fn write_frame(frame: &mut [f32], left: f64, right: f64) {
    match frame {
        [] => {}
        [mono] => *mono = to_sample((left + right) * 0.5),
        [l, r, rest @ ..] => {
            *l = to_sample(left);
            *r = to_sample(right);
            rest.fill(0.0);
        }
    }
}

#[inline]
fn to_sample(x: f64) -> f32 {
    x.clamp(-1.0, 1.0) as f32
}
