//! cpal output backend for native hosts.
//!
//! The stream is built when the renderer is attached and starts paused;
//! [`AudioContext::resume`] begins playback.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use crate::config::EngineConfig;
use crate::context::{AudioBackend, AudioContext, ContextState};
use crate::error::{EngineError, EngineResult};
use crate::render::{lock, Renderer};

/// Opens contexts on the host's default output device.
#[derive(Debug, Default)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        CpalBackend
    }
}

impl AudioBackend for CpalBackend {
    fn open(&mut self, config: &EngineConfig) -> EngineResult<Box<dyn AudioContext>> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::SubsystemUnavailable("no output device".to_string()))?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using audio device: {}", device_name);

        let supported = device
            .default_output_config()
            .map_err(|e| EngineError::SubsystemUnavailable(e.to_string()))?;
        if supported.sample_format() != SampleFormat::F32 {
            log::warn!(
                "Device default format is {:?}; requesting f32 anyway",
                supported.sample_format()
            );
        }
        let stream_config: StreamConfig = supported.config();

        log::info!(
            "Audio config: {} channels, {}Hz (engine default {}Hz)",
            stream_config.channels,
            stream_config.sample_rate.0,
            config.sample_rate
        );

        Ok(Box::new(CpalContext {
            device,
            config: stream_config,
            stream: None,
            state: if config.start_suspended {
                ContextState::Suspended
            } else {
                ContextState::Running
            },
        }))
    }
}

struct CpalContext {
    device: cpal::Device,
    config: StreamConfig,
    stream: Option<Stream>,
    state: ContextState,
}

impl AudioContext for CpalContext {
    fn sample_rate(&self) -> f64 {
        self.config.sample_rate.0 as f64
    }

    fn state(&self) -> ContextState {
        self.state
    }

    fn resume(&mut self) -> EngineResult<ContextState> {
        match self.state {
            ContextState::Running => return Ok(ContextState::Running),
            ContextState::Closed => {
                return Err(EngineError::ResumeFailed("context is closed".to_string()));
            }
            ContextState::Suspended => {}
        }
        if let Some(stream) = &self.stream {
            stream
                .play()
                .map_err(|e| EngineError::ResumeFailed(e.to_string()))?;
        }
        self.state = ContextState::Running;
        log::info!("Audio stream running");
        Ok(ContextState::Running)
    }

    fn attach(&mut self, renderer: Renderer) -> EngineResult<()> {
        let channels = self.config.channels as usize;
        let renderer = Arc::new(Mutex::new(renderer));

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    lock(&renderer).render(data, channels);
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| EngineError::Stream(e.to_string()))?;

        if self.state == ContextState::Running {
            stream.play().map_err(|e| EngineError::Stream(e.to_string()))?;
        } else {
            // Some hosts start streams immediately.
            if let Err(e) = stream.pause() {
                log::warn!("Could not pause new audio stream: {}", e);
            }
        }
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        self.stream = None;
        self.state = ContextState::Closed;
    }
}
