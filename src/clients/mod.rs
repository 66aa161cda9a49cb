//! HTTP clients for the external STT/TTS/chat-completion services. Thin
//! wrappers; the wire contracts they implement are specified, the services
//! themselves are out of scope.

pub mod chat;
pub mod sse;
pub mod stt;
pub mod tts;

pub use chat::{ChatClient, CompletionParams};
pub use stt::SttClient;
pub use tts::TtsClient;
