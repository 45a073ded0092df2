//! Renderer: pulls the source through the graph for an output callback.
//!
//! Device callbacks ask for arbitrary frame counts; the graph only processes
//! whole quanta. The renderer keeps the unread tail of the last quantum and
//! serves it before rendering the next one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::dsp::mixer::write_frame;
use crate::graph::SignalGraph;
use crate::source::{SharedSource, SourceFlags};

pub type SharedGraph = Arc<Mutex<SignalGraph>>;

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Renderer {
    graph: SharedGraph,
    source: SharedSource,
    flags: Arc<SourceFlags>,
    left: Vec<f64>,
    right: Vec<f64>,
    cursor: usize,
}

impl Renderer {
    pub fn new(graph: SharedGraph, source: SharedSource, flags: Arc<SourceFlags>) -> Self {
        let quantum = lock(&graph).quantum();
        Renderer {
            graph,
            source,
            flags,
            left: vec![0.0; quantum],
            right: vec![0.0; quantum],
            cursor: quantum,
        }
    }

    /// Fill an interleaved output buffer with `channels` channels per frame.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        for frame in out.chunks_mut(channels.max(1)) {
            if self.cursor >= self.left.len() {
                self.render_quantum();
            }
            write_frame(frame, self.left[self.cursor], self.right[self.cursor]);
            self.cursor += 1;
        }
    }

    /// Render one quantum into the internal buffers.
    fn render_quantum(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);
        {
            let mut source = lock(&self.source);
            if self.flags.reassert(&mut *source) {
                log::debug!("Media changed; reapplied rate and pitch flags");
            }
            source.read(&mut self.left, &mut self.right);
        }
        lock(&self.graph).process(&mut self.left, &mut self.right);
        self.cursor = 0;
    }
}
