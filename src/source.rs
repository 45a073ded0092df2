//! Media source: the playable stream the graph taps.
//!
//! The playback layer owns fetching and decoding; the engine only reads and
//! writes the rate and pitch-preservation flags and pulls frames into the
//! graph. Like a media element, a source forgets both flags whenever new
//! media is loaded, and bumps its generation so the engine can reassert them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[cfg(feature = "wav")]
use crate::error::{EngineError, EngineResult};

/// Lower bound for playback rate.
pub const MIN_PLAYBACK_RATE: f64 = 0.25;
/// Upper bound for playback rate.
pub const MAX_PLAYBACK_RATE: f64 = 4.0;

pub trait MediaSource: Send {
    fn playback_rate(&self) -> f64;
    fn set_playback_rate(&mut self, rate: f64);

    fn preserves_pitch(&self) -> bool;
    fn set_preserves_pitch(&mut self, preserve: bool);

    /// Incremented every time the underlying media changes.
    fn generation(&self) -> u64;

    /// Fill both channels with the next frames; returns how many frames were
    /// produced. Frames past that count are left untouched.
    fn read(&mut self, left: &mut [f64], right: &mut [f64]) -> usize;
}

/// Shared handle to the media source: the engine writes flags, the render thread reads frames.
pub type SharedSource = Arc<Mutex<dyn MediaSource>>;

/// The rate and pitch flags the engine wants on the source.
///
/// Shared with the render thread, which compares generations before each
/// quantum and reapplies the flags when the media has changed underneath.
#[derive(Debug)]
pub struct SourceFlags {
    playback_rate: AtomicU64,
    preserves_pitch: AtomicBool,
    seen_generation: AtomicU64,
}

impl SourceFlags {
    pub fn new() -> Self {
        SourceFlags {
            playback_rate: AtomicU64::new(1.0_f64.to_bits()),
            preserves_pitch: AtomicBool::new(true),
            seen_generation: AtomicU64::new(0),
        }
    }

    pub fn playback_rate(&self) -> f64 {
        f64::from_bits(self.playback_rate.load(Ordering::Relaxed))
    }

    pub fn set_playback_rate(&self, rate: f64) {
        self.playback_rate.store(rate.to_bits(), Ordering::Relaxed);
    }

    pub fn preserves_pitch(&self) -> bool {
        self.preserves_pitch.load(Ordering::Relaxed)
    }

    pub fn set_preserves_pitch(&self, preserve: bool) {
        self.preserves_pitch.store(preserve, Ordering::Relaxed);
    }

    /// Write both flags onto `source`.
    pub fn apply(&self, source: &mut dyn MediaSource) {
        source.set_playback_rate(self.playback_rate());
        source.set_preserves_pitch(self.preserves_pitch());
        self.seen_generation.store(source.generation(), Ordering::Relaxed);
    }

    /// Reapply the flags if `source` loaded new media since the last check.
    /// Returns whether anything was written.
    pub fn reassert(&self, source: &mut dyn MediaSource) -> bool {
        if source.generation() == self.seen_generation.load(Ordering::Relaxed) {
            return false;
        }
        self.apply(source);
        true
    }
}

impl Default for SourceFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// An in-memory decoded track played with varispeed resampling.
///
/// Rate changes shift pitch with tempo (tape-style); time-stretching for
/// pitch preservation is left to richer sources, so the flag is only stored.
#[derive(Debug, Clone)]
pub struct BufferedSource {
    song_id: Option<String>,
    left: Vec<f32>,
    right: Vec<f32>,
    source_rate: f64,
    output_rate: f64,
    position: f64,
    playing: bool,
    playback_rate: f64,
    preserves_pitch: bool,
    generation: u64,
}

impl BufferedSource {
    pub fn new(output_rate: f64) -> Self {
        BufferedSource {
            song_id: None,
            left: Vec::new(),
            right: Vec::new(),
            source_rate: output_rate,
            output_rate,
            position: 0.0,
            playing: false,
            playback_rate: 1.0,
            preserves_pitch: true,
            generation: 0,
        }
    }

    /// Replace the media with decoded interleaved stereo frames.
    ///
    /// Resets rate to 1.0 and pitch preservation to true.
    pub fn load(&mut self, song_id: impl Into<String>, interleaved: &[f32], sample_rate: f64) {
        let frames = interleaved.len() / 2;
        self.left = interleaved.iter().step_by(2).copied().take(frames).collect();
        self.right = interleaved.iter().skip(1).step_by(2).copied().take(frames).collect();
        self.source_rate = if sample_rate > 0.0 { sample_rate } else { self.output_rate };
        self.song_id = Some(song_id.into());
        self.position = 0.0;
        self.playback_rate = 1.0;
        self.preserves_pitch = true;
        self.generation += 1;
        log::debug!(
            "Loaded {:?}: {} frames at {} Hz",
            self.song_id,
            frames,
            self.source_rate
        );
    }

    /// Decode a WAV file held in memory and load it.
    #[cfg(feature = "wav")]
    pub fn load_wav(&mut self, song_id: impl Into<String>, bytes: &[u8]) -> EngineResult<()> {
        use hound::{SampleFormat, WavReader};

        let reader = WavReader::new(std::io::Cursor::new(bytes))
            .map_err(|e| EngineError::Decode(e.to_string()))?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| EngineError::Decode(e.to_string()))?,
            SampleFormat::Int => {
                let scale = 1.0 / (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| EngineError::Decode(e.to_string()))?
            }
        };

        let stereo: Vec<f32> = samples
            .chunks_exact(channels)
            .flat_map(|frame| {
                let l = frame[0];
                let r = if channels > 1 { frame[1] } else { l };
                [l, r]
            })
            .collect();
        self.load(song_id, &stereo, spec.sample_rate as f64);
        Ok(())
    }

    /// Output rate of the graph this source feeds.
    pub fn set_output_rate(&mut self, rate: f64) {
        if rate > 0.0 {
            self.output_rate = rate;
        }
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn song_id(&self) -> Option<&str> {
        self.song_id.as_deref()
    }

    /// Playback position in seconds of media time.
    pub fn position_seconds(&self) -> f64 {
        self.position / self.source_rate
    }

    pub fn seek(&mut self, seconds: f64) {
        let max = self.left.len() as f64;
        self.position = (seconds.max(0.0) * self.source_rate).min(max);
    }

    pub fn duration_seconds(&self) -> f64 {
        self.left.len() as f64 / self.source_rate
    }

    pub fn is_ended(&self) -> bool {
        self.position >= self.left.len() as f64
    }

    fn sample(buf: &[f32], pos: f64) -> f64 {
        let index = pos.floor() as usize;
        let frac = pos - index as f64;
        let a = buf.get(index).copied().unwrap_or(0.0) as f64;
        let b = buf.get(index + 1).copied().unwrap_or(0.0) as f64;
        a + (b - a) * frac
    }
}

impl MediaSource for BufferedSource {
    fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    fn set_playback_rate(&mut self, rate: f64) {
        if rate.is_finite() {
            self.playback_rate = rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE);
        }
    }

    fn preserves_pitch(&self) -> bool {
        self.preserves_pitch
    }

    fn set_preserves_pitch(&mut self, preserve: bool) {
        self.preserves_pitch = preserve;
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn read(&mut self, left: &mut [f64], right: &mut [f64]) -> usize {
        if !self.playing {
            return 0;
        }
        let step = self.playback_rate * self.source_rate / self.output_rate;
        let len = self.left.len() as f64;
        let mut produced = 0;
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            if self.position >= len {
                self.playing = false;
                break;
            }
            *l = Self::sample(&self.left, self.position);
            *r = Self::sample(&self.right, self.position);
            self.position += step;
            produced += 1;
        }
        produced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_track(frames: usize) -> Vec<f32> {
        (0..frames).flat_map(|i| [i as f32, -(i as f32)]).collect()
    }

    #[test]
    fn load_resets_flags_and_bumps_generation() {
        let mut src = BufferedSource::new(44100.0);
        src.set_playback_rate(0.85);
        src.set_preserves_pitch(false);
        let before = src.generation();

        src.load("song-1", &ramp_track(10), 44100.0);
        assert_eq!(src.playback_rate(), 1.0);
        assert!(src.preserves_pitch());
        assert_eq!(src.generation(), before + 1);
        assert_eq!(src.song_id(), Some("song-1"));
    }

    #[test]
    fn paused_source_produces_nothing() {
        let mut src = BufferedSource::new(100.0);
        src.load("a", &ramp_track(10), 100.0);
        let mut l = [0.0; 4];
        let mut r = [0.0; 4];
        assert_eq!(src.read(&mut l, &mut r), 0);
    }

    #[test]
    fn reads_deinterleaved_frames() {
        let mut src = BufferedSource::new(100.0);
        src.load("a", &ramp_track(10), 100.0);
        src.play();
        let mut l = [0.0; 4];
        let mut r = [0.0; 4];
        assert_eq!(src.read(&mut l, &mut r), 4);
        assert_eq!(l, [0.0, 1.0, 2.0, 3.0]);
        assert_eq!(r, [0.0, -1.0, -2.0, -3.0]);
    }

    #[test]
    fn slower_rate_interpolates() {
        let mut src = BufferedSource::new(100.0);
        src.load("a", &ramp_track(10), 100.0);
        src.play();
        src.set_playback_rate(0.5);
        let mut l = [0.0; 4];
        let mut r = [0.0; 4];
        src.read(&mut l, &mut r);
        assert_eq!(l, [0.0, 0.5, 1.0, 1.5]);
    }

    #[test]
    fn stops_at_end_of_media() {
        let mut src = BufferedSource::new(100.0);
        src.load("a", &ramp_track(3), 100.0);
        src.play();
        let mut l = [9.0; 5];
        let mut r = [9.0; 5];
        assert_eq!(src.read(&mut l, &mut r), 3);
        assert!(src.is_ended());
        assert!(!src.is_playing());
    }

    #[test]
    fn rate_is_clamped_and_nan_ignored() {
        let mut src = BufferedSource::new(100.0);
        src.set_playback_rate(10.0);
        assert_eq!(src.playback_rate(), MAX_PLAYBACK_RATE);
        src.set_playback_rate(f64::NAN);
        assert_eq!(src.playback_rate(), MAX_PLAYBACK_RATE);
    }

    #[test]
    fn flags_reassert_only_after_media_change() {
        let flags = SourceFlags::new();
        let mut src = BufferedSource::new(100.0);
        flags.set_playback_rate(0.85);
        flags.set_preserves_pitch(false);
        flags.apply(&mut src);
        assert!(!flags.reassert(&mut src), "Same media needs no reassertion");

        src.load("next", &ramp_track(10), 100.0);
        assert_eq!(src.playback_rate(), 1.0);
        assert!(flags.reassert(&mut src));
        assert_eq!(src.playback_rate(), 0.85);
        assert!(!src.preserves_pitch());
    }

    #[cfg(feature = "wav")]
    #[test]
    fn decodes_mono_wav_to_stereo() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut bytes = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut bytes, spec).unwrap();
            for v in [0_i16, 16384, -16384, 0] {
                writer.write_sample(v).unwrap();
            }
            writer.finalize().unwrap();
        }

        let mut src = BufferedSource::new(8000.0);
        src.load_wav("wav", bytes.get_ref()).unwrap();
        src.play();
        let mut l = [0.0; 4];
        let mut r = [0.0; 4];
        assert_eq!(src.read(&mut l, &mut r), 4);
        assert_eq!(l, [0.0, 0.5, -0.5, 0.0]);
        assert_eq!(l, r);
    }

    #[cfg(feature = "wav")]
    #[test]
    fn rejects_garbage_wav() {
        let mut src = BufferedSource::new(8000.0);
        assert!(src.load_wav("bad", b"not a wav file").is_err());
        assert_eq!(src.song_id(), None);
    }

    #[test]
    fn seek_and_duration() {
        let mut src = BufferedSource::new(100.0);
        src.load("a", &ramp_track(200), 100.0);
        assert_eq!(src.duration_seconds(), 2.0);
        src.seek(1.5);
        assert_eq!(src.position_seconds(), 1.5);
        src.seek(10.0);
        assert!(src.is_ended());
    }
}
