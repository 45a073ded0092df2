//! Audio context: the platform audio subsystem the graph runs in.
//!
//! The engine never talks to a device directly. An [`AudioBackend`] opens an
//! [`AudioContext`], which reports its sample rate and state, can be resumed
//! after a user gesture, and drives a [`Renderer`] once one is attached.
//! [`OfflineBackend`] renders on demand and is what tests and the WASM worklet
//! use; the `device-output` feature adds a cpal backend.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::render::{lock, Renderer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextState {
    /// Created but not producing audio (autoplay policy, or explicitly paused).
    Suspended,
    Running,
    Closed,
}

pub trait AudioContext {
    fn sample_rate(&self) -> f64;

    fn state(&self) -> ContextState;

    /// Move to [`ContextState::Running`]. Resuming a running context is a no-op.
    fn resume(&mut self) -> EngineResult<ContextState>;

    /// Hand the renderer to the context's output.
    fn attach(&mut self, renderer: Renderer) -> EngineResult<()>;

    fn close(&mut self);
}

/// Factory for audio contexts.
pub trait AudioBackend {
    fn open(&mut self, config: &EngineConfig) -> EngineResult<Box<dyn AudioContext>>;
}

struct OfflineShared {
    state: ContextState,
    renderer: Option<Renderer>,
    sample_rate: f64,
    opens: usize,
}

/// A backend whose contexts render only when asked to through an [`OfflineHandle`].
pub struct OfflineBackend {
    shared: Arc<Mutex<OfflineShared>>,
    sample_rate: Option<f64>,
    failing_opens: usize,
    refuse_resume: bool,
}

impl OfflineBackend {
    pub fn new() -> Self {
        OfflineBackend {
            shared: Arc::new(Mutex::new(OfflineShared {
                state: ContextState::Closed,
                renderer: None,
                sample_rate: 0.0,
                opens: 0,
            })),
            sample_rate: None,
            failing_opens: 0,
            refuse_resume: false,
        }
    }

    /// Override the sample rate from the engine config.
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Make the next `count` opens fail as if no subsystem were available.
    pub fn failing_opens(mut self, count: usize) -> Self {
        self.failing_opens = count;
        self
    }

    /// Contexts refuse to leave the suspended state.
    pub fn refusing_resume(mut self) -> Self {
        self.refuse_resume = true;
        self
    }

    pub fn handle(&self) -> OfflineHandle {
        OfflineHandle {
            shared: self.shared.clone(),
        }
    }
}

impl Default for OfflineBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for OfflineBackend {
    fn open(&mut self, config: &EngineConfig) -> EngineResult<Box<dyn AudioContext>> {
        if self.failing_opens > 0 {
            self.failing_opens -= 1;
            return Err(EngineError::SubsystemUnavailable(
                "offline backend configured to fail".to_string(),
            ));
        }
        let sample_rate = self.sample_rate.unwrap_or(config.sample_rate);
        let state = if config.start_suspended {
            ContextState::Suspended
        } else {
            ContextState::Running
        };
        {
            let mut shared = lock(&self.shared);
            shared.opens += 1;
            shared.state = state;
            shared.sample_rate = sample_rate;
            shared.renderer = None;
        }
        Ok(Box::new(OfflineContext {
            shared: self.shared.clone(),
            sample_rate,
            refuse_resume: self.refuse_resume,
        }))
    }
}

struct OfflineContext {
    shared: Arc<Mutex<OfflineShared>>,
    sample_rate: f64,
    refuse_resume: bool,
}

impl AudioContext for OfflineContext {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn state(&self) -> ContextState {
        lock(&self.shared).state
    }

    fn resume(&mut self) -> EngineResult<ContextState> {
        let mut shared = lock(&self.shared);
        match shared.state {
            ContextState::Running => Ok(ContextState::Running),
            ContextState::Closed => Err(EngineError::ResumeFailed("context is closed".to_string())),
            ContextState::Suspended if self.refuse_resume => Err(EngineError::ResumeFailed(
                "resume refused without user activation".to_string(),
            )),
            ContextState::Suspended => {
                shared.state = ContextState::Running;
                Ok(ContextState::Running)
            }
        }
    }

    fn attach(&mut self, renderer: Renderer) -> EngineResult<()> {
        let mut shared = lock(&self.shared);
        if shared.state == ContextState::Closed {
            return Err(EngineError::SubsystemUnavailable("context is closed".to_string()));
        }
        shared.renderer = Some(renderer);
        Ok(())
    }

    fn close(&mut self) {
        let mut shared = lock(&self.shared);
        shared.state = ContextState::Closed;
        shared.renderer = None;
    }
}

/// Drives an [`OfflineBackend`]'s current context from outside the engine.
#[derive(Clone)]
pub struct OfflineHandle {
    shared: Arc<Mutex<OfflineShared>>,
}

impl OfflineHandle {
    /// How many contexts the backend has opened.
    pub fn opens(&self) -> usize {
        lock(&self.shared).opens
    }

    pub fn state(&self) -> ContextState {
        lock(&self.shared).state
    }

    pub fn sample_rate(&self) -> f64 {
        lock(&self.shared).sample_rate
    }

    /// Render into an interleaved buffer. A context that is not running (or
    /// has nothing attached) yields silence and does not advance its clock.
    pub fn render_into(&self, out: &mut [f32], channels: usize) {
        let mut shared = lock(&self.shared);
        let running = shared.state == ContextState::Running;
        match shared.renderer.as_mut() {
            Some(renderer) if running => renderer.render(out, channels),
            _ => out.fill(0.0),
        }
    }

    /// Render `frames` stereo frames.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * 2];
        self.render_into(&mut out, 2);
        out
    }

    /// Render and discard `seconds` of audio.
    pub fn advance(&self, seconds: f64) {
        let frames = (seconds * self.sample_rate()).ceil().max(0.0) as usize;
        let mut scratch = vec![0.0; 1024 * 2];
        let mut remaining = frames;
        while remaining > 0 {
            let n = remaining.min(1024);
            self.render_into(&mut scratch[..n * 2], 2);
            remaining -= n;
        }
    }
}
