//! DSP primitives: the node implementations behind the effect graph.
//!
//! Each primitive mirrors the WebAudio node it stands in for, so the same
//! parameter values produce the same sound whether the graph runs on a
//! native output device or inside an AudioWorklet via WASM.

pub mod convolver;
pub mod filter;
pub mod mixer;
pub mod oscillator;
pub mod panner;
pub mod shaper;
