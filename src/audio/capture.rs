//! Microphone audio capture using cpal.
//!
//! Captures audio at the device's native sample rate and downsamples to the
//! pipeline's target rate (16 kHz mono) before emitting fixed-size chunks.
//!
//! Grounded in the teacher's `audio/capture.rs`: same device-selection
//! fallback, same mono downmix + linear-interpolation downsample, same
//! `try_send`-with-rate-limited-drop-logging pattern so the audio callback
//! thread never blocks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AudioConfig;
use crate::error::{Result, VuiError};
use crate::pipeline::messages::AudioChunk;

/// Audio capture from the system microphone via `cpal`.
pub struct CpalCapture {
    device: cpal::Device,
    stream_config: StreamConfig,
    target_sample_rate: u32,
    target_chunk_frames: usize,
}

impl CpalCapture {
    /// # Errors
    /// Returns an error if no input device is available or its default
    /// config cannot be read.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.input_device {
            let requested = host
                .input_devices()
                .map_err(|e| VuiError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| d.name().map(|n| n == *name).unwrap_or(false));

            match requested {
                Some(device) => device,
                None => {
                    warn!("configured input device '{name}' not found, falling back to default input device");
                    host.default_input_device().ok_or_else(|| VuiError::Audio("no default input device".into()))?
                }
            }
        } else {
            host.default_input_device().ok_or_else(|| VuiError::Audio("no default input device".into()))?
        };

        let device_name = device.name().unwrap_or_else(|_| "<unknown>".into());
        info!("using input device: {device_name}");

        let default_config =
            device.default_input_config().map_err(|e| VuiError::Audio(format!("no default input config: {e}")))?;

        let native_rate = default_config.sample_rate();
        let native_channels = default_config.channels();

        let stream_config = StreamConfig { channels: native_channels, sample_rate: native_rate, buffer_size: cpal::BufferSize::Default };

        info!("native input config: {}Hz, {} channels", native_rate.0, native_channels);
        if native_rate.0 != config.input_sample_rate {
            info!("will downsample from {}Hz to {}Hz", native_rate.0, config.input_sample_rate);
        }

        Ok(Self { device, stream_config, target_sample_rate: config.input_sample_rate, target_chunk_frames: config.buffer_size as usize })
    }

    /// Run the capture loop, sending audio chunks to `tx`. Blocks until
    /// `cancel` fires.
    ///
    /// # Errors
    /// Returns an error if the input stream cannot be built or started.
    pub async fn run(&self, tx: mpsc::Sender<AudioChunk>, cancel: CancellationToken) -> Result<()> {
        let native_rate = self.stream_config.sample_rate.0;
        let native_channels = self.stream_config.channels;
        let target_rate = self.target_sample_rate;
        let chunk_len = self.target_chunk_frames.max(1);
        let tx_clone = tx.clone();
        let mut pending: VecDeque<f32> = VecDeque::with_capacity(chunk_len.saturating_mul(4));

        let dropped_full = AtomicU64::new(0);
        let last_report_ms = AtomicU64::new(0);
        let tx_closed = AtomicBool::new(false);

        let stream = self
            .device
            .build_input_stream(
                &self.stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let mono = if native_channels > 1 { to_mono(data, native_channels) } else { data.to_vec() };
                    let samples = if native_rate != target_rate { downsample(&mono, native_rate, target_rate) } else { mono };

                    pending.extend(samples);

                    while pending.len() >= chunk_len {
                        if tx_closed.load(Ordering::Relaxed) {
                            pending.clear();
                            break;
                        }

                        let out: Vec<f32> = pending.drain(..chunk_len).collect();
                        let chunk = AudioChunk { samples: out, sample_rate: target_rate, captured_at: Instant::now() };
                        match tx_clone.try_send(chunk) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                dropped_full.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                tx_closed.store(true, Ordering::Relaxed);
                            }
                        }

                        let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0);
                        let last = last_report_ms.load(Ordering::Relaxed);
                        if now_ms.saturating_sub(last) >= 2_000
                            && last_report_ms.compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed).is_ok()
                        {
                            let n = dropped_full.swap(0, Ordering::Relaxed);
                            if tx_closed.load(Ordering::Relaxed) {
                                debug!("audio channel closed (pipeline stopped)");
                            } else if n > 0 {
                                debug!("audio channel full, dropped {n} chunks (last 2s)");
                            }
                        }
                    }
                },
                move |err| error!("audio input stream error: {err}"),
                None,
            )
            .map_err(|e| VuiError::Audio(format!("failed to build input stream: {e}")))?;

        stream.play().map_err(|e| VuiError::Audio(format!("failed to start input stream: {e}")))?;
        info!("audio capture started: native {native_rate}Hz -> target {target_rate}Hz");

        cancel.cancelled().await;
        drop(stream);
        info!("audio capture stopped");
        Ok(())
    }

    /// # Errors
    /// Returns an error if devices cannot be enumerated.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().map_err(|e| VuiError::Audio(format!("cannot enumerate devices: {e}")))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    data.chunks_exact(ch).map(|frame| frame.iter().sum::<f32>() / ch as f32).collect()
}

/// Linear-interpolation downsampler. Sufficient for 48kHz→16kHz speech
/// audio (energy is below 8kHz); no anti-alias filter needed.
fn downsample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(src_rate) / f64::from(dst_rate);
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            f64::from(samples[idx]) * (1.0 - frac) + f64::from(samples[idx + 1]) * frac
        } else {
            f64::from(samples[idx.min(samples.len() - 1)])
        };

        output.push(sample as f32);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downsample_halves_sample_count_for_2x_rate() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let out = downsample(&samples, 32000, 16000);
        assert_eq!(out.len(), 50);
    }

    #[test]
    fn downsample_is_identity_when_rates_match() {
        let samples = vec![1.0, 2.0, 3.0];
        assert_eq!(downsample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn to_mono_averages_interleaved_channels() {
        let stereo = vec![1.0, 3.0, 2.0, 4.0];
        assert_eq!(to_mono(&stereo, 2), vec![2.0, 3.0]);
    }
}
