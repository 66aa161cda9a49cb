//! Sentence splitting and the chunk-to-sentence reassembler.
//!
//! Grounded in `internal/chat/sentences.go`: the same
//! `\n\s*|(\.|\?|!)+(\s+|$)` boundary regex, the same buffer/flush state
//! machine in `ChunksToSentences`.

use regex::Regex;
use std::sync::LazyLock;
use tokio::sync::mpsc;

use crate::pipeline::messages::ResponseChunk;

static END_OF_SENTENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*|(\.|\?|!)+(\s+|$)").expect("static regex compiles"));

/// Split `msg` at sentence boundaries, preserving trailing whitespace on
/// each returned piece (used internally by the reassembler's buffering
/// logic, which needs to know whether the tail piece still needs more
/// input).
#[must_use]
pub fn split_preserving_whitespace(msg: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut pos = 0;
    for m in END_OF_SENTENCE.find_iter(msg) {
        sentences.push(msg[pos..m.end()].to_string());
        pos = m.end();
    }
    if pos < msg.len() {
        sentences.push(msg[pos..].to_string());
    }
    sentences
}

/// Split `msg` into trimmed, non-empty sentences. The public, one-shot
/// entry point (used e.g. for a tool-call rationale).
#[must_use]
pub fn split_into_sentences(msg: &str) -> Vec<String> {
    split_preserving_whitespace(msg).into_iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

fn ends_with_punctuation(s: &str) -> bool {
    matches!(s.chars().last(), Some('.') | Some('?') | Some('!'))
}

/// Suppress a reasoning-model's `<think>...</think>` span from the spoken
/// output: a sentence that is exactly `<think>` opens the span (logged, not
/// emitted); everything until a `</think>` closes it is logged as
/// "thinking" instead of sent to TTS. Returns the visible remainder of
/// `sentence`, if any. Grounded in the original's `responseParser.parseSentence`.
fn filter_thinking(thinking: &mut bool, sentence: &str) -> Option<String> {
    if sentence.trim() == "<think>" {
        *thinking = true;
        return None;
    }

    if *thinking {
        let Some(pos) = sentence.find("</think>") else {
            for thought in split_into_sentences(sentence) {
                tracing::debug!(thought = %thought, "assistant (thinking)");
            }
            return None;
        };

        for thought in split_into_sentences(&sentence[..pos]) {
            tracing::debug!(thought = %thought, "assistant (thinking)");
        }
        *thinking = false;
        let remainder = &sentence[pos + "</think>".len()..];
        return if remainder.trim().is_empty() { None } else { Some(remainder.to_string()) };
    }

    Some(sentence.to_string())
}

/// Buffers assistant text per turn and emits the smallest sentence-shaped
/// units as soon as they're complete, so TTS can start speaking before the
/// model finishes its full answer. Also filters out `<think>...</think>`
/// spans a reasoning model may emit, so they're logged rather than spoken.
pub struct ChunkReassembler;

impl ChunkReassembler {
    pub async fn run(mut input: mpsc::Receiver<ResponseChunk>, output: mpsc::Sender<ResponseChunk>) {
        let mut buf = String::new();
        let mut thinking = false;

        while let Some(chunk) = input.recv().await {
            match chunk {
                ResponseChunk::Chunk { request_num, text, user_only: true } => {
                    if output.send(ResponseChunk::Chunk { request_num, text, user_only: true }).await.is_err() {
                        return;
                    }
                }
                ResponseChunk::Chunk { request_num, text, user_only: false } => {
                    buf.push_str(&text);
                    let sentences = split_preserving_whitespace(&buf);
                    if sentences.len() > 1 {
                        for sentence in &sentences[..sentences.len() - 1] {
                            let Some(visible) = filter_thinking(&mut thinking, sentence) else { continue };
                            if output.send(ResponseChunk::Chunk { request_num, text: visible, user_only: false }).await.is_err() {
                                return;
                            }
                        }
                        buf.clear();
                        let tail = &sentences[sentences.len() - 1];
                        if ends_with_punctuation(tail) {
                            if let Some(visible) = filter_thinking(&mut thinking, tail) {
                                if output.send(ResponseChunk::Chunk { request_num, text: visible, user_only: false }).await.is_err() {
                                    return;
                                }
                            }
                        } else {
                            buf.push_str(tail);
                        }
                    }
                }
                ResponseChunk::End { request_num } => {
                    if !buf.is_empty() {
                        let sentence = buf.strip_suffix("</s>").unwrap_or(&buf).to_string();
                        if let Some(visible) = filter_thinking(&mut thinking, &sentence) {
                            if output.send(ResponseChunk::Chunk { request_num, text: visible, user_only: false }).await.is_err() {
                                return;
                            }
                        }
                    }
                    buf.clear();
                    thinking = false;
                    if output.send(ResponseChunk::End { request_num }).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_terminal_punctuation_and_keeps_trailing_space() {
        let parts = split_preserving_whitespace("Hello world. How are you?");
        assert_eq!(parts, vec!["Hello world. ", "How are you?"]);
    }

    #[test]
    fn splits_on_newline_runs() {
        let parts = split_preserving_whitespace("line one\n\nline two");
        assert_eq!(parts, vec!["line one\n\n", "line two"]);
    }

    #[test]
    fn trimmed_variant_drops_empties() {
        let parts = split_into_sentences("  Hi there.   ");
        assert_eq!(parts, vec!["Hi there."]);
    }

    #[tokio::test]
    async fn e2_three_chunks_become_one_sentence_then_end() {
        let (tx_in, rx_in) = mpsc::channel(8);
        let (tx_out, mut rx_out) = mpsc::channel(8);
        tokio::spawn(ChunkReassembler::run(rx_in, tx_out));

        for text in ["Hello ", "world", "."] {
            tx_in.send(ResponseChunk::Chunk { request_num: 2, text: text.into(), user_only: false }).await.unwrap();
        }
        tx_in.send(ResponseChunk::End { request_num: 2 }).await.unwrap();
        drop(tx_in);

        let first = rx_out.recv().await.unwrap();
        match first {
            ResponseChunk::Chunk { text, .. } => assert_eq!(text, "Hello world."),
            _ => panic!("expected chunk"),
        }
        assert!(matches!(rx_out.recv().await.unwrap(), ResponseChunk::End { request_num: 2 }));
        assert!(rx_out.recv().await.is_none());
    }

    #[tokio::test]
    async fn user_only_chunks_pass_through_without_buffering() {
        let (tx_in, rx_in) = mpsc::channel(8);
        let (tx_out, mut rx_out) = mpsc::channel(8);
        tokio::spawn(ChunkReassembler::run(rx_in, tx_out));

        tx_in
            .send(ResponseChunk::Chunk { request_num: 1, text: "Let me use my \"getWeather\" tool.".into(), user_only: true })
            .await
            .unwrap();
        drop(tx_in);

        match rx_out.recv().await.unwrap() {
            ResponseChunk::Chunk { text, user_only, .. } => {
                assert_eq!(text, "Let me use my \"getWeather\" tool.");
                assert!(user_only);
            }
            _ => panic!("expected chunk"),
        }
    }

    #[tokio::test]
    async fn incomplete_trailing_sentence_is_flushed_on_end() {
        let (tx_in, rx_in) = mpsc::channel(8);
        let (tx_out, mut rx_out) = mpsc::channel(8);
        tokio::spawn(ChunkReassembler::run(rx_in, tx_out));

        tx_in.send(ResponseChunk::Chunk { request_num: 5, text: "no punctuation here".into(), user_only: false }).await.unwrap();
        tx_in.send(ResponseChunk::End { request_num: 5 }).await.unwrap();
        drop(tx_in);

        match rx_out.recv().await.unwrap() {
            ResponseChunk::Chunk { text, .. } => assert_eq!(text, "no punctuation here"),
            _ => panic!("expected chunk"),
        }
        assert!(matches!(rx_out.recv().await.unwrap(), ResponseChunk::End { request_num: 5 }));
    }
}
