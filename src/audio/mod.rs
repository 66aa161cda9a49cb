//! Audio device I/O: microphone capture and speaker playback via `cpal`.
//!
//! Out of the core orchestration layer's scope per spec §1 ("audio device
//! I/O" is named as an external collaborator); kept here as the thin
//! adapter the `chat` CLI subcommand needs to actually run end to end,
//! grounded in the teacher's `audio/capture.rs`/`audio/playback.rs`.

pub mod capture;
pub mod playback;

pub use capture::CpalCapture;
pub use playback::CpalPlayback;
