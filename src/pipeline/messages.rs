//! Message types passed between pipeline stages — spec §3's transient
//! queue elements, plus the raw-audio types the capture/VAD/STT stages pass
//! among themselves before a turn exists.

use std::time::Instant;

/// A chunk of raw audio samples from the microphone.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved f32 samples, mono, at the configured input sample rate.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub captured_at: Instant,
}

/// A complete speech segment detected by VAD, ready for STT.
#[derive(Debug, Clone)]
pub struct SpeechSegment {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub started_at: Instant,
}

/// `UserUtterance{text}` — a transcription emitted by the STT stage, before
/// the wake-word gate decides whether it becomes a turn.
#[derive(Debug, Clone)]
pub struct UserUtterance {
    pub text: String,
}

/// A turn's chat-completion request, carrying only the `requestNum` the
/// orchestrator should drive to completion; the transcript itself lives in
/// the shared `Conversation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatRequest {
    pub request_num: i64,
}

/// One unit of the orchestrator's output stream: either a piece of text (an
/// assistant chunk, possibly user-only) or the turn-terminating sentinel.
#[derive(Debug, Clone)]
pub enum ResponseChunk {
    Chunk { request_num: i64, text: String, user_only: bool },
    End { request_num: i64 },
}

impl ResponseChunk {
    #[must_use]
    pub fn request_num(&self) -> i64 {
        match self {
            ResponseChunk::Chunk { request_num, .. } | ResponseChunk::End { request_num } => *request_num,
        }
    }

    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, ResponseChunk::End { .. })
    }
}

/// A request to play the turn-acknowledgement tone once per new turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneRequest {
    pub request_num: i64,
}

/// A rendered audio payload ready for the sink/broadcast: either a
/// synthesized sentence or the acknowledgement tone.
#[derive(Debug, Clone)]
pub struct AudioMessage {
    pub request_num: i64,
    pub text: String,
    pub user_only: bool,
    pub wave_data: Vec<u8>,
}
