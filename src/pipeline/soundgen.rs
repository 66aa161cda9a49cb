//! Acknowledgement-tone generator: a short sine tone played back to the user
//! the moment a turn is admitted, so there is audible feedback before the
//! model has produced anything.
//!
//! Grounded in `internal/soundgen/soundgen.go`'s `Generator`: 500 Hz, 300 ms,
//! 16-bit mono WAV, generated once at startup and reused for every
//! non-superseded [`ToneRequest`].

use std::f64::consts::PI;
use std::io::Cursor;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::conversation::Conversation;
use crate::error::Result;
use crate::pipeline::messages::{AudioMessage, ToneRequest};

const FREQUENCY_HZ: f64 = 500.0;
const DURATION_MS: u64 = 300;

/// Build the 16-bit mono WAV payload for a `frequency`/`duration` sine tone
/// at `sample_rate`.
pub fn generate_tone(sample_rate: u32, frequency_hz: f64, duration_ms: u64) -> Result<Vec<u8>> {
    let num_samples = ((duration_ms as f64 / 1000.0) * sample_rate as f64).ceil() as usize;
    let spec = hound::WavSpec { channels: 1, sample_rate, bits_per_sample: 16, sample_format: hound::SampleFormat::Int };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for i in 0..num_samples {
            let phase = frequency_hz * i as f64 / sample_rate as f64;
            let sample = (phase * 2.0 * PI).sin() * 32767.0;
            writer.write_sample(sample as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

pub struct SoundGenerator {
    conversation: Arc<Conversation>,
    tone_wav: Vec<u8>,
}

impl SoundGenerator {
    pub fn new(conversation: Arc<Conversation>, sample_rate: u32) -> Result<Self> {
        let tone_wav = generate_tone(sample_rate, FREQUENCY_HZ, DURATION_MS)?;
        Ok(SoundGenerator { conversation, tone_wav })
    }

    pub async fn run(self, mut requests: mpsc::Receiver<ToneRequest>, output: mpsc::Sender<AudioMessage>) {
        while let Some(req) = requests.recv().await {
            if self.conversation.request_counter() > req.request_num {
                continue;
            }
            let msg = AudioMessage {
                request_num: req.request_num,
                text: "(acknowledged)".into(),
                user_only: true,
                wave_data: self.tone_wav.clone(),
            };
            if output.send(msg).await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tone_is_a_valid_wav_of_the_expected_sample_count() {
        let wav = generate_tone(16000, FREQUENCY_HZ, DURATION_MS).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 4800);
    }

    #[tokio::test]
    async fn superseded_tone_requests_are_skipped() {
        let conv = Arc::new(Conversation::new("sys"));
        let gen = SoundGenerator::new(conv.clone(), 16000).unwrap();
        let (tx_in, rx_in) = mpsc::channel(4);
        let (tx_out, mut rx_out) = mpsc::channel(4);
        tokio::spawn(gen.run(rx_in, tx_out));

        conv.admit_user_turn(crate::conversation::ContentPart::Text("a".into()));
        conv.admit_user_turn(crate::conversation::ContentPart::Text("b".into()));
        // request_counter is now 3; a tone request for the stale turn 2 must be dropped.
        tx_in.send(ToneRequest { request_num: 2 }).await.unwrap();
        tx_in.send(ToneRequest { request_num: 3 }).await.unwrap();
        drop(tx_in);

        let msg = rx_out.recv().await.unwrap();
        assert_eq!(msg.request_num, 3);
        assert!(rx_out.recv().await.is_none());
    }
}
