//! TTS synthesis stage: renders each sentence-granular [`ResponseChunk`]
//! emitted by the reassembler into a WAV payload via the upstream TTS
//! client, and forwards it as an [`AudioMessage`].
//!
//! Grounded in `internal/vui/vui.go`'s synth-stage wiring: one task reading
//! text chunks, one `TtsClient::synthesize` call per chunk, skip stale
//! turns the same way the tone generator does.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::clients::tts::TtsClient;
use crate::conversation::Conversation;
use crate::pipeline::messages::{AudioMessage, ResponseChunk};

pub struct TtsStage {
    client: Arc<TtsClient>,
    conversation: Arc<Conversation>,
}

impl TtsStage {
    #[must_use]
    pub fn new(client: Arc<TtsClient>, conversation: Arc<Conversation>) -> Self {
        TtsStage { client, conversation }
    }

    pub async fn run(self, mut input: mpsc::Receiver<ResponseChunk>, output: mpsc::Sender<AudioMessage>) {
        while let Some(chunk) = input.recv().await {
            let ResponseChunk::Chunk { request_num, text, user_only } = chunk else {
                continue;
            };
            if text.trim().is_empty() {
                continue;
            }
            if self.conversation.request_counter() > request_num {
                continue;
            }

            let wave_data = match self.client.synthesize(&text).await {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(request_num, error = %e, "TTS synthesis failed, dropping sentence");
                    continue;
                }
            };

            if self.conversation.request_counter() > request_num {
                continue;
            }

            let msg = AudioMessage { request_num, text, user_only, wave_data };
            if output.send(msg).await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stale_turn_chunks_are_not_synthesized() {
        let conv = Arc::new(Conversation::new("sys"));
        conv.admit_user_turn(crate::conversation::ContentPart::Text("a".into()));
        conv.admit_user_turn(crate::conversation::ContentPart::Text("b".into()));
        // counter is now 3; a chunk for stale turn 2 must never reach the client.
        let stage = TtsStage::new(Arc::new(TtsClient::new("http://unused", "model", "")), conv);

        let (tx_in, rx_in) = mpsc::channel(4);
        let (tx_out, mut rx_out) = mpsc::channel(4);
        tokio::spawn(stage.run(rx_in, tx_out));

        tx_in.send(ResponseChunk::Chunk { request_num: 2, text: "stale".into(), user_only: false }).await.unwrap();
        drop(tx_in);

        assert!(rx_out.recv().await.is_none());
    }

    #[tokio::test]
    async fn end_sentinels_and_blank_text_are_ignored() {
        let conv = Arc::new(Conversation::new("sys"));
        let stage = TtsStage::new(Arc::new(TtsClient::new("http://unused", "model", "")), conv);
        let (tx_in, rx_in) = mpsc::channel(4);
        let (tx_out, mut rx_out) = mpsc::channel(4);
        tokio::spawn(stage.run(rx_in, tx_out));

        tx_in.send(ResponseChunk::End { request_num: 1 }).await.unwrap();
        tx_in.send(ResponseChunk::Chunk { request_num: 1, text: "   ".into(), user_only: false }).await.unwrap();
        drop(tx_in);

        assert!(rx_out.recv().await.is_none());
    }
}
