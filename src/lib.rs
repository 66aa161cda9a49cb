//! vui: the conversational orchestration layer for a real-time voice
//! assistant pipeline.
//!
//! A live microphone (or HTTP/WebSocket audio upload) feeds a cascade of
//! bounded-queue stages — VAD, STT, wake-word gate, turn admitter, chat
//! orchestrator, tool runner, sentence splitter, TTS, audio sink/broadcast —
//! ending in spoken replies streamed back to the listener. STT, TTS, chat
//! completion, and VAD are external collaborators reached over HTTP; this
//! crate owns the orchestration between them.
//!
//! # Architecture
//!
//! - [`conversation`] — the transcript, request counter, turn cancellation.
//! - [`pipeline`] — stage wiring: wake-word gate, turn admitter, chat
//!   orchestrator, tool runner, agents, sentence splitter, tone generator.
//! - [`callguard`] — per-turn duplicate tool-call suppression.
//! - [`clients`] — thin HTTP clients for the upstream chat/STT/TTS APIs.
//! - [`broadcast`] — the multi-subscriber audio fan-out and its HTTP/WS
//!   surface.
//! - [`audio`] — microphone capture and speaker playback via `cpal`.
//! - [`vad`] — voice-activity detection (energy-based placeholder).
//! - [`config`] — CLI flags and the YAML config file.

pub mod audio;
pub mod broadcast;
pub mod callguard;
pub mod clients;
pub mod config;
pub mod conversation;
pub mod error;
pub mod pipeline;
pub mod vad;

pub use config::{Cli, VuiConfig};
pub use conversation::Conversation;
pub use error::{Result, VuiError};
