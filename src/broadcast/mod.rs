//! Multi-subscriber audio broadcast: one wake-word-gated conversation per
//! channel id, any number of HTTP/WebSocket listeners streaming its
//! synthesized replies, and the WAV framing shared by both transports.
//!
//! Grounded in `internal/broadcast/`, generalized from the original's
//! goroutine-per-subscriber fan-out to `tokio`'s task/channel primitives.

pub mod channel;
pub mod http;
pub mod stream;
pub mod wav;

pub use channel::{Channel, ChannelBlueprint, ChannelRegistry, SessionFactory};
pub use http::{build_router, AppState};
