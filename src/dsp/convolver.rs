//! Convolution reverb: uniform-partitioned overlap-save FFT convolution.
//!
//! The impulse response is split into partitions of one render block each;
//! every partition is transformed once up front, and each incoming block is
//! transformed once and multiplied against the whole frequency-domain delay
//! line. Latency is zero beyond the block itself.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Overall response level, matching the WebAudio ConvolverNode normalization.
const GAIN_CALIBRATION: f64 = 0.00125;
const GAIN_CALIBRATION_SAMPLE_RATE: f64 = 44100.0;

/// A stereo impulse response.
#[derive(Debug, Clone)]
pub struct ImpulseResponse {
    pub left: Vec<f64>,
    pub right: Vec<f64>,
}

impl ImpulseResponse {
    /// Synthetic room: independent decaying noise per channel.
    ///
    /// Sample `i` of `len` is `noise * (1 - i/len)^decay`. The same `seed`
    /// always yields the same response.
    pub fn decaying_noise(sample_rate: f64, seconds: f64, decay: f64, seed: u64) -> Self {
        let len = ((sample_rate * seconds) as usize).max(1);
        let mut rng = XorShift::new(seed);
        let mut channel = || {
            (0..len)
                .map(|i| rng.next_bipolar() * (1.0 - i as f64 / len as f64).powf(decay))
                .collect::<Vec<_>>()
        };
        let left = channel();
        let right = channel();
        ImpulseResponse { left, right }
    }

    pub fn len(&self) -> usize {
        self.left.len().max(self.right.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scale so the response has a fixed overall power, independent of its length.
    pub fn normalized(mut self, sample_rate: f64) -> Self {
        let count = (self.left.len() + self.right.len()).max(1) as f64;
        let energy: f64 = self.left.iter().chain(&self.right).map(|s| s * s).sum();
        let power = (energy / count).sqrt();
        if power > 1e-12 {
            let scale = GAIN_CALIBRATION / power * (GAIN_CALIBRATION_SAMPLE_RATE / sample_rate);
            for s in self.left.iter_mut().chain(self.right.iter_mut()) {
                *s *= scale;
            }
        }
        self
    }
}

/// Minimal xorshift64* generator; reproducible noise without a global RNG.
struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        XorShift(seed.max(1))
    }

    fn next_bipolar(&mut self) -> f64 {
        self.0 ^= self.0 >> 12;
        self.0 ^= self.0 << 25;
        self.0 ^= self.0 >> 27;
        let bits = self.0.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 11;
        (bits as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
    }
}

struct Channel {
    partitions: Vec<Vec<Complex<f64>>>,
    delay_line: Vec<Vec<Complex<f64>>>,
    head: usize,
    input: Vec<f64>,
}

impl Channel {
    fn new(response: &[f64], block: usize, fft: &Arc<dyn Fft<f64>>, scratch: &mut [Complex<f64>]) -> Self {
        let size = block * 2;
        let count = response.len().div_ceil(block).max(1);
        let partitions = (0..count)
            .map(|p| {
                let mut spectrum = vec![Complex::new(0.0, 0.0); size];
                let start = p * block;
                let end = (start + block).min(response.len());
                for (dst, &src) in spectrum.iter_mut().zip(&response[start.min(end)..end]) {
                    dst.re = src;
                }
                fft.process_with_scratch(&mut spectrum, scratch);
                spectrum
            })
            .collect();
        Channel {
            partitions,
            delay_line: vec![vec![Complex::new(0.0, 0.0); size]; count],
            head: 0,
            input: vec![0.0; size],
        }
    }

    fn clear(&mut self) {
        self.input.fill(0.0);
        for slot in &mut self.delay_line {
            slot.fill(Complex::new(0.0, 0.0));
        }
    }
}

/// Stereo convolution engine operating on fixed-size blocks.
pub struct Convolver {
    block: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    channels: [Channel; 2],
    work: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    silent_blocks: usize,
}

impl Convolver {
    pub fn new(response: &ImpulseResponse, block: usize) -> Self {
        let block = block.max(1);
        let size = block * 2;
        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        let mut scratch = vec![Complex::new(0.0, 0.0); scratch_len];

        let left = Channel::new(&response.left, block, &forward, &mut scratch);
        let right = Channel::new(&response.right, block, &forward, &mut scratch);

        Convolver {
            block,
            forward,
            inverse,
            channels: [left, right],
            work: vec![Complex::new(0.0, 0.0); size],
            scratch,
            silent_blocks: usize::MAX,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block
    }

    fn partition_count(&self) -> usize {
        self.channels[0].partitions.len().max(self.channels[1].partitions.len())
    }

    /// Convolve one block in place. Both slices must be exactly `block_size()` long.
    pub fn process_block(&mut self, left: &mut [f64], right: &mut [f64]) {
        debug_assert_eq!(left.len(), self.block);
        debug_assert_eq!(right.len(), self.block);

        let silent = left.iter().chain(right.iter()).all(|&s| s == 0.0);
        if silent {
            self.silent_blocks = self.silent_blocks.saturating_add(1);
            // The tail has fully played out; drop the history and idle.
            let count = self.partition_count();
            if self.silent_blocks > count {
                if self.silent_blocks == count + 1 {
                    for channel in &mut self.channels {
                        channel.clear();
                    }
                }
                return;
            }
        } else {
            self.silent_blocks = 0;
        }

        let size = self.block * 2;
        let scale = 1.0 / size as f64;
        for (channel, samples) in self.channels.iter_mut().zip([left, right]) {
            channel.input.copy_within(self.block.., 0);
            channel.input[self.block..].copy_from_slice(samples);

            let count = channel.delay_line.len();
            channel.head = (channel.head + count - 1) % count;
            let slot = &mut channel.delay_line[channel.head];
            for (dst, &src) in slot.iter_mut().zip(&channel.input) {
                *dst = Complex::new(src, 0.0);
            }
            self.forward.process_with_scratch(slot, &mut self.scratch);

            self.work.fill(Complex::new(0.0, 0.0));
            for (p, partition) in channel.partitions.iter().enumerate() {
                let spectrum = &channel.delay_line[(channel.head + p) % count];
                for ((acc, x), h) in self.work.iter_mut().zip(spectrum).zip(partition) {
                    *acc += x * h;
                }
            }
            self.inverse.process_with_scratch(&mut self.work, &mut self.scratch);

            for (out, y) in samples.iter_mut().zip(&self.work[self.block..]) {
                *out = y.re * scale;
            }
        }
    }
}
