//! WAV decode/encode helpers for the broadcast surface.
//!
//! Inbound POSTs and the upstream TTS/tone WAV payloads are decoded to raw
//! 16-bit PCM samples via `hound`; outbound streaming re-wraps those
//! samples in a RIFF/WAVE header whose data-chunk length is the
//! "indefinite length" sentinel `0xFFFFFFFF`, since the stream has no
//! known total length up front. Grounded in `internal/broadcast/wav.go`.

use std::io::Cursor;

use crate::error::{Result, VuiError};

pub const SAMPLE_RATE: u32 = 16_000;
pub const CHANNELS: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;

/// Decode a RIFF/WAVE byte buffer to interleaved 16-bit PCM samples.
/// Rejects anything that isn't 16-bit PCM (spec §4.7/§6: "16-bit PCM
/// required").
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<i16>> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).map_err(|e| VuiError::Audio(format!("malformed WAV body: {e}")))?;
    let spec = reader.spec();
    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        return Err(VuiError::Audio(format!("expected 16-bit PCM audio, got {}-bit {:?}", spec.bits_per_sample, spec.sample_format)));
    }
    reader.samples::<i16>().collect::<std::result::Result<Vec<_>, _>>().map_err(|e| VuiError::Audio(format!("decode PCM samples: {e}")))
}

/// Synthesize a streaming RIFF/WAVE header for 16 kHz/16-bit/mono with an
/// indefinite data-chunk length, emitted once at the start of a WAV-mode
/// response before any PCM bytes.
#[must_use]
pub fn streaming_header() -> Vec<u8> {
    let byte_rate = SAMPLE_RATE * u32::from(CHANNELS) * u32::from(BITS_PER_SAMPLE) / 8;
    let block_align = CHANNELS * (BITS_PER_SAMPLE / 8);

    let mut header = Vec::with_capacity(44);
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
    header.extend_from_slice(b"WAVE");
    header.extend_from_slice(b"fmt ");
    header.extend_from_slice(&16u32.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes()); // PCM
    header.extend_from_slice(&CHANNELS.to_le_bytes());
    header.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    header.extend_from_slice(&byte_rate.to_le_bytes());
    header.extend_from_slice(&block_align.to_le_bytes());
    header.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    header.extend_from_slice(b"data");
    header.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
    header
}

/// Little-endian byte encoding of PCM samples, as emitted on the wire in
/// both WAV and raw modes.
#[must_use]
pub fn samples_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_pcm16(samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec { channels: 1, sample_rate: SAMPLE_RATE, bits_per_sample: 16, sample_format: hound::SampleFormat::Int };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in samples {
                writer.write_sample(*s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn decode_round_trips_16_bit_pcm() {
        let samples = vec![1, -1, 1000, -1000, 0];
        let wav = encode_pcm16(&samples);
        assert_eq!(decode_pcm16(&wav).unwrap(), samples);
    }

    #[test]
    fn decode_rejects_non_16_bit_audio() {
        let spec = hound::WavSpec { channels: 1, sample_rate: SAMPLE_RATE, bits_per_sample: 8, sample_format: hound::SampleFormat::Int };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(1i8).unwrap();
            writer.finalize().unwrap();
        }
        assert!(decode_pcm16(&cursor.into_inner()).is_err());
    }

    #[test]
    fn streaming_header_has_indefinite_data_length() {
        let header = streaming_header();
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(&header[40..44], &0xFFFF_FFFFu32.to_le_bytes());
    }

    #[test]
    fn samples_encode_little_endian() {
        let bytes = samples_to_le_bytes(&[1, -1]);
        assert_eq!(bytes, vec![1, 0, 0xFF, 0xFF]);
    }
}
