//! Outbound audio stream framing: WAV-mode vs raw-PCM-mode bytes, the
//! jitter-buffer-busting zero pad, and the 50-second keep-alive.
//!
//! Grounded in `internal/broadcast/writer.go`'s `AudioStreamWriter`: a
//! 50ms-polling write loop that pads exactly once per gap and keeps the
//! connection alive during longer silences so intermediate proxies don't
//! time out an idle chunked response.

use std::convert::Infallible;
use std::time::Duration;

use async_stream::stream;
use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;

use crate::broadcast::wav::{samples_to_le_bytes, streaming_header, CHANNELS, SAMPLE_RATE};
use crate::pipeline::messages::AudioMessage;

/// Default buffer-fill duration, overridable by the `buffer-ms` query
/// param.
pub const DEFAULT_BUFFER_MS: u64 = 1250;
const PAD_GAP: Duration = Duration::from_millis(50);
const KEEPALIVE_AFTER: Duration = Duration::from_secs(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// RIFF/WAVE header once, then raw PCM.
    Wav,
    /// Raw PCM only, no header.
    Raw,
}

impl OutputMode {
    /// WebSocket connections always force raw mode; HTTP GET selects by
    /// `Accept: audio/x-raw` (spec §4.7).
    #[must_use]
    pub fn from_accept_header(accept: Option<&str>) -> Self {
        match accept {
            Some(a) if a.contains("audio/x-raw") => OutputMode::Raw,
            _ => OutputMode::Wav,
        }
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            OutputMode::Wav => "audio/wav",
            OutputMode::Raw => "audio/x-raw;rate=16000;bits=16;channels=1;encoding=signed-int;big-endian=false",
        }
    }
}

/// Build the outbound byte stream for one subscriber: a RIFF header (WAV
/// mode only) followed by PCM bytes decoded from each [`AudioMessage`]'s
/// WAV payload, interspersed with zero-pad/keep-alive filler per spec §4.7.
pub fn audio_byte_stream(
    mut rx: mpsc::Receiver<AudioMessage>,
    mode: OutputMode,
    buffer_ms: u64,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    stream! {
        if mode == OutputMode::Wav {
            yield Ok(Bytes::from(streaming_header()));
        }

        let pad_samples = (u64::from(SAMPLE_RATE) * buffer_ms / 1000) as usize;
        let mut pad_emitted_since_arrival = false;
        let mut silence = Duration::ZERO;

        loop {
            match tokio::time::timeout(PAD_GAP, rx.recv()).await {
                Ok(Some(msg)) => {
                    let Ok(samples) = crate::broadcast::wav::decode_pcm16(&msg.wave_data) else {
                        continue;
                    };
                    yield Ok(Bytes::from(samples_to_le_bytes(&samples)));
                    pad_emitted_since_arrival = false;
                    silence = Duration::ZERO;
                }
                Ok(None) => break,
                Err(_elapsed) => {
                    silence += PAD_GAP;

                    if !pad_emitted_since_arrival {
                        pad_emitted_since_arrival = true;
                        yield Ok(Bytes::from(samples_to_le_bytes(&vec![0i16; pad_samples])));
                    }

                    if silence >= KEEPALIVE_AFTER {
                        silence = Duration::ZERO;
                        yield Ok(Bytes::from(samples_to_le_bytes(&[0i16])));
                    }
                }
            }
        }
    }
}

#[must_use]
pub fn channels_hint() -> u16 {
    CHANNELS
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn wav_of(samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec { channels: 1, sample_rate: SAMPLE_RATE, bits_per_sample: 16, sample_format: hound::SampleFormat::Int };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in samples {
                writer.write_sample(*s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[tokio::test(start_paused = true)]
    async fn e6_pad_follows_a_60ms_gap_after_one_publish() {
        let (tx, rx) = mpsc::channel(4);
        let stream = audio_byte_stream(rx, OutputMode::Wav, DEFAULT_BUFFER_MS);
        tokio::pin!(stream);

        let hundred_ms_samples = vec![0i16; 1600]; // 100ms @ 16kHz
        tx.send(AudioMessage { request_num: 1, text: String::new(), user_only: false, wave_data: wav_of(&hundred_ms_samples) }).await.unwrap();

        let header = stream.next().await.unwrap().unwrap();
        assert_eq!(&header[0..4], b"RIFF");

        let payload = stream.next().await.unwrap().unwrap();
        assert_eq!(payload.len(), hundred_ms_samples.len() * 2);

        tokio::time::advance(Duration::from_millis(60)).await;

        let pad = stream.next().await.unwrap().unwrap();
        let expected_pad_samples = (u64::from(SAMPLE_RATE) * DEFAULT_BUFFER_MS / 1000) as usize;
        assert_eq!(pad.len(), expected_pad_samples * 2);
        assert!(pad.iter().all(|b| *b == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_pad_is_emitted_per_silence_run() {
        let (_tx, rx) = mpsc::channel::<AudioMessage>(4);
        let stream = audio_byte_stream(rx, OutputMode::Raw, DEFAULT_BUFFER_MS);
        tokio::pin!(stream);

        let expected_pad_samples = (u64::from(SAMPLE_RATE) * DEFAULT_BUFFER_MS / 1000) as usize;

        tokio::time::advance(Duration::from_millis(60)).await;
        let pad = stream.next().await.unwrap().unwrap();
        assert_eq!(pad.len(), expected_pad_samples * 2);

        tokio::time::advance(Duration::from_millis(200)).await;
        let next = stream.next().await.unwrap().unwrap();
        assert_ne!(next.len(), expected_pad_samples * 2, "a second pad must not be emitted mid-silence-run");
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_is_emitted_after_fifty_seconds_of_silence() {
        let (_tx, rx) = mpsc::channel::<AudioMessage>(4);
        let stream = audio_byte_stream(rx, OutputMode::Raw, DEFAULT_BUFFER_MS);
        tokio::pin!(stream);

        // consume the initial pad
        tokio::time::advance(Duration::from_millis(60)).await;
        let _pad = stream.next().await.unwrap().unwrap();

        tokio::time::advance(Duration::from_secs(50)).await;
        let mut saw_keepalive = false;
        for _ in 0..1100 {
            let chunk = stream.next().await.unwrap().unwrap();
            if chunk.len() == 2 {
                saw_keepalive = true;
                break;
            }
        }
        assert!(saw_keepalive, "expected a 2-byte keep-alive sample within 50s of silence");
    }

    #[test]
    fn raw_mode_selected_by_accept_header() {
        assert_eq!(OutputMode::from_accept_header(Some("audio/x-raw")), OutputMode::Raw);
        assert_eq!(OutputMode::from_accept_header(Some("audio/wav")), OutputMode::Wav);
        assert_eq!(OutputMode::from_accept_header(None), OutputMode::Wav);
    }
}
