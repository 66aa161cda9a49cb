//! Wires one conversation's full stage chain — wake-word gate through to
//! rendered audio — so the `chat` CLI subcommand and the broadcast
//! [`crate::broadcast::Channel`] can both drive a conversation without
//! duplicating the plumbing.
//!
//! Grounded in `internal/vui/vui.go`'s top-level wiring function, which
//! does exactly this: construct every stage, connect their channels, spawn
//! each as a task.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::clients::tts::TtsClient;
use crate::conversation::Conversation;
use crate::pipeline::admitter::TurnAdmitter;
use crate::pipeline::capacity;
use crate::pipeline::messages::{AudioMessage, UserUtterance};
use crate::pipeline::orchestrator::{ChatOrchestrator, ToolContext};
use crate::pipeline::sentence::ChunkReassembler;
use crate::pipeline::soundgen::SoundGenerator;
use crate::pipeline::tts_stage::TtsStage;
use crate::pipeline::wake_gate::WakeWordGate;

/// Everything a session needs beyond the conversation itself and the
/// wake-word string.
pub struct SessionDeps {
    pub orchestrator: Arc<ChatOrchestrator>,
    pub tool_context: Arc<ToolContext>,
    pub tts_client: Arc<TtsClient>,
    pub sample_rate: u32,
}

/// Spawn the full stage chain for one conversation: wake-word gate, turn
/// admitter, chat orchestrator, sentence splitter, TTS synthesis, and the
/// acknowledgement-tone generator, all feeding a single merged
/// [`AudioMessage`] output.
///
/// Returns the gate's input (fed with [`UserUtterance`]s from STT) and the
/// merged audio output.
#[must_use]
pub fn spawn_session(
    wake_word: &str,
    conversation: Arc<Conversation>,
    deps: SessionDeps,
) -> crate::error::Result<(mpsc::Sender<UserUtterance>, mpsc::Receiver<AudioMessage>)> {
    let gate = WakeWordGate::new(wake_word)?;

    let (tx_utterance, rx_utterance) = mpsc::channel(capacity::TRANSCRIPTION_TO_GATE);
    let (tx_gated, rx_gated) = mpsc::channel(capacity::GATE_TO_ADMITTER);
    let (tx_chat_req, rx_chat_req) = mpsc::channel(capacity::ADMITTER_TO_ORCHESTRATOR);
    let (tx_tone_req, rx_tone_req) = mpsc::channel(capacity::ADMITTER_TO_ORCHESTRATOR);
    let (tx_response, rx_response) = mpsc::channel(capacity::ORCHESTRATOR_TO_REASSEMBLER);
    let (tx_sentence, rx_sentence) = mpsc::channel(capacity::REASSEMBLER_TO_TTS);
    let (tx_audio, rx_audio) = mpsc::channel(capacity::TTS_TO_SINK);

    tokio::spawn(gate.run(rx_utterance, tx_gated));
    tokio::spawn(TurnAdmitter::new(conversation.clone()).run(rx_gated, tx_chat_req, tx_tone_req));
    tokio::spawn(deps.orchestrator.run(rx_chat_req, conversation.clone(), deps.tool_context, tx_response));
    tokio::spawn(ChunkReassembler::run(rx_response, tx_sentence));
    tokio::spawn(TtsStage::new(deps.tts_client, conversation.clone()).run(rx_sentence, tx_audio.clone()));

    let sound_gen = SoundGenerator::new(conversation, deps.sample_rate)?;
    tokio::spawn(sound_gen.run(rx_tone_req, tx_audio));

    Ok((tx_utterance, rx_audio))
}
