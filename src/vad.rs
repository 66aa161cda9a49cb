//! Voice-activity detection: out of the core's scope per spec §1 (the
//! upstream collaborator is "the VAD native model wrapper"), but the
//! pipeline needs *some* gate between raw capture and the STT client.
//!
//! `EnergyVad` is the energy-threshold placeholder the pipeline runs with
//! until a real model-backed detector is wired in behind the same trait —
//! grounded in SPEC_FULL.md §6's note that this mirrors the teacher's own
//! documented preference for an energy gate ahead of a Silero/ONNX model.

use crate::config::AudioConfig;
use crate::pipeline::messages::{AudioChunk, SpeechSegment};

/// Abstracts speech/non-speech classification so a real model-backed
/// detector can replace [`EnergyVad`] without touching the capture stage.
pub trait VoiceActivityDetector: Send {
    /// Returns `true` if `chunk` contains speech.
    fn is_speech(&mut self, chunk: &AudioChunk) -> bool;
}

/// RMS-threshold gate: a chunk is speech if its root-mean-square amplitude
/// (scaled to the 16-bit range used by `--min-volume`) meets the
/// configured minimum.
pub struct EnergyVad {
    min_volume: i32,
}

impl EnergyVad {
    #[must_use]
    pub fn new(config: &AudioConfig) -> Self {
        EnergyVad { min_volume: config.min_volume }
    }

    fn rms_i16(samples: &[f32]) -> i32 {
        if samples.is_empty() {
            return 0;
        }
        let sum_sq: f64 = samples.iter().map(|s| f64::from(*s) * f64::from(*s)).sum();
        let rms = (sum_sq / samples.len() as f64).sqrt();
        (rms * f64::from(i16::MAX)) as i32
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn is_speech(&mut self, chunk: &AudioChunk) -> bool {
        Self::rms_i16(&chunk.samples) >= self.min_volume
    }
}

/// Accumulates consecutive speech chunks into a [`SpeechSegment`], closing
/// the segment after a run of non-speech chunks (hangover) so trailing
/// words are not clipped.
pub struct SegmentAccumulator<V> {
    vad: V,
    hangover_chunks: u32,
    silence_run: u32,
    segment: Option<SpeechSegment>,
}

impl<V: VoiceActivityDetector> SegmentAccumulator<V> {
    #[must_use]
    pub fn new(vad: V, hangover_chunks: u32) -> Self {
        SegmentAccumulator { vad, hangover_chunks, silence_run: 0, segment: None }
    }

    /// Feed one chunk; returns a completed segment if this chunk closed one
    /// (a speech run followed by `hangover_chunks` consecutive silent
    /// chunks).
    pub fn push(&mut self, chunk: AudioChunk) -> Option<SpeechSegment> {
        let speech = self.vad.is_speech(&chunk);

        if speech {
            self.silence_run = 0;
            let seg = self.segment.get_or_insert_with(|| SpeechSegment {
                samples: Vec::new(),
                sample_rate: chunk.sample_rate,
                started_at: chunk.captured_at,
            });
            seg.samples.extend(chunk.samples);
            return None;
        }

        if let Some(seg) = self.segment.as_mut() {
            seg.samples.extend(chunk.samples);
            self.silence_run += 1;
            if self.silence_run >= self.hangover_chunks {
                self.silence_run = 0;
                return self.segment.take();
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn chunk(samples: Vec<f32>) -> AudioChunk {
        AudioChunk { samples, sample_rate: 16000, captured_at: Instant::now() }
    }

    #[test]
    fn silence_is_below_default_threshold() {
        let mut vad = EnergyVad { min_volume: 500 };
        assert!(!vad.is_speech(&chunk(vec![0.0; 160])));
    }

    #[test]
    fn loud_signal_is_above_threshold() {
        let mut vad = EnergyVad { min_volume: 500 };
        assert!(vad.is_speech(&chunk(vec![0.5; 160])));
    }

    #[test]
    fn accumulator_closes_segment_after_hangover() {
        let vad = EnergyVad { min_volume: 500 };
        let mut acc = SegmentAccumulator::new(vad, 2);

        assert!(acc.push(chunk(vec![0.5; 10])).is_none());
        assert!(acc.push(chunk(vec![0.0; 10])).is_none());
        let seg = acc.push(chunk(vec![0.0; 10]));
        assert!(seg.is_some());
        assert_eq!(seg.unwrap().samples.len(), 30);
    }

    #[test]
    fn silence_alone_never_opens_a_segment() {
        let vad = EnergyVad { min_volume: 500 };
        let mut acc = SegmentAccumulator::new(vad, 2);
        assert!(acc.push(chunk(vec![0.0; 10])).is_none());
        assert!(acc.push(chunk(vec![0.0; 10])).is_none());
        assert!(acc.push(chunk(vec![0.0; 10])).is_none());
    }
}
