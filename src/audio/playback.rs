//! Audio playback to system speakers via `cpal`.
//!
//! Grounded in the teacher's `audio/playback.rs`: a shared buffer fed to
//! the output callback, polled from the async side until drained.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use tracing::{error, info};

use crate::config::AudioConfig;
use crate::error::{Result, VuiError};

pub struct CpalPlayback {
    device: cpal::Device,
    stream_config: StreamConfig,
}

impl CpalPlayback {
    /// # Errors
    /// Returns an error if no output device is available.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.output_device {
            host.output_devices()
                .map_err(|e| VuiError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| d.name().map(|n| n == *name).unwrap_or(false))
                .ok_or_else(|| VuiError::Audio(format!("output device '{name}' not found")))?
        } else {
            host.default_output_device().ok_or_else(|| VuiError::Audio("no default output device".into()))?
        };

        let device_name = device.name().unwrap_or_else(|_| "<unknown>".into());
        info!("using output device: {device_name}");

        let stream_config = StreamConfig { channels: 1, sample_rate: cpal::SampleRate(config.output_sample_rate), buffer_size: cpal::BufferSize::Default };

        Ok(Self { device, stream_config })
    }

    /// Play `samples` through the output device; blocks (on an async sleep
    /// loop) until playback finishes.
    ///
    /// # Errors
    /// Returns an error if the output stream cannot be built or started.
    pub async fn play(&mut self, samples: &[f32]) -> Result<()> {
        let buffer = Arc::new(Mutex::new(PlaybackBuffer { samples: samples.to_vec(), position: 0, finished: false }));
        let buffer_clone = Arc::clone(&buffer);

        let stream = self
            .device
            .build_output_stream(
                &self.stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    let Ok(mut buf) = buffer_clone.lock() else { return };
                    for sample in data.iter_mut() {
                        if buf.position < buf.samples.len() {
                            *sample = buf.samples[buf.position];
                            buf.position += 1;
                        } else {
                            *sample = 0.0;
                            buf.finished = true;
                        }
                    }
                },
                move |err| error!("audio output stream error: {err}"),
                None,
            )
            .map_err(|e| VuiError::Audio(format!("failed to build output stream: {e}")))?;

        stream.play().map_err(|e| VuiError::Audio(format!("failed to start output stream: {e}")))?;

        loop {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            let finished = buffer.lock().expect("playback buffer mutex poisoned").finished;
            if finished {
                break;
            }
        }

        drop(stream);
        Ok(())
    }

    /// # Errors
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.output_devices().map_err(|e| VuiError::Audio(format!("cannot enumerate devices: {e}")))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

struct PlaybackBuffer {
    samples: Vec<f32>,
    position: usize,
    finished: bool,
}
