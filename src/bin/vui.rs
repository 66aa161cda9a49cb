//! CLI entrypoint: parse flags, load the config file, and dispatch to the
//! `chat`, `serve`, or `devices` subcommand.
//!
//! Grounded in `internal/vui/vui.go`'s `main` plus `cmd/vui`'s flag/config
//! bootstrap: construct every shared client once, wire the session, exit
//! with status 1 on any fatal startup error.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use vui::audio::{CpalCapture, CpalPlayback};
use vui::broadcast::channel::{ChannelBlueprint, ChannelRegistry};
use vui::broadcast::http::{build_router, AppState};
use vui::clients::chat::ChatClient;
use vui::clients::stt::SttClient;
use vui::clients::tts::TtsClient;
use vui::config::{Cli, Command, Settings};
use vui::conversation::Conversation;
use vui::pipeline::agent::AgentTool;
use vui::pipeline::orchestrator::{ChatOrchestrator, ToolContext};
use vui::pipeline::session::{spawn_session, SessionDeps};
use vui::pipeline::tool_runner::{ProcessContainerRunner, ToolRegistry};
use vui::vad::{EnergyVad, SegmentAccumulator};
use vui::VuiError;

const MAX_CHAT_TURNS: u32 = 8;
const HANGOVER_CHUNKS: u32 = 8;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(cli.log_level.as_filter())).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal startup error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> vui::Result<()> {
    let file_config: vui::config::VuiConfig = match &cli.config {
        Some(path) => vui::config::load(path)?,
        None => Default::default(),
    };
    let settings = Arc::new(Settings::resolve(&cli, file_config));

    match cli.command.clone().unwrap_or(Command::Chat) {
        Command::Devices => run_devices(),
        Command::Chat => run_chat(settings).await,
        Command::Serve => run_serve(settings).await,
    }
}

fn run_devices() -> vui::Result<()> {
    println!("input devices:");
    for name in CpalCapture::list_input_devices()? {
        println!("  {name}");
    }
    println!("output devices:");
    for name in CpalPlayback::list_output_devices()? {
        println!("  {name}");
    }
    Ok(())
}

fn tool_context(settings: &Settings, orchestrator: &Arc<ChatOrchestrator>) -> ToolContext {
    let runner = Arc::new(ProcessContainerRunner);
    let registry = ToolRegistry::new(settings.functions.clone(), runner.clone());
    let agents = settings
        .agents
        .iter()
        .cloned()
        .map(|def| AgentTool::new(def, orchestrator.clone(), runner.clone()))
        .collect();
    ToolContext { registry, agents }
}

/// Build the shared chat orchestrator for a [`Settings`], independent of
/// which subcommand is driving it.
fn build_orchestrator(settings: &Settings, chat_client: Arc<ChatClient>) -> Arc<ChatOrchestrator> {
    Arc::new(ChatOrchestrator::new(chat_client, settings.chat_model.clone(), settings.temperature, 0.0, None, MAX_CHAT_TURNS, String::new()))
}

/// Live microphone-to-speaker conversation loop: capture audio, segment it
/// with the energy VAD, transcribe each segment, and speak the pipeline's
/// replies as they're synthesized.
async fn run_chat(settings: Arc<Settings>) -> vui::Result<()> {
    if settings.wake_word.is_empty() {
        return Err(VuiError::FatalStartup("wake word must be configured (--wake-word or config file)".into()));
    }

    let chat_client = Arc::new(ChatClient::new(settings.server_url.clone(), settings.api_key.clone()));
    let stt_client = Arc::new(SttClient::new(settings.server_url.clone(), settings.stt_model.clone()));
    let tts_client = Arc::new(TtsClient::new(settings.server_url.clone(), settings.tts_model.clone(), settings.api_key.clone()));
    let orchestrator = build_orchestrator(&settings, chat_client);
    let tool_context = Arc::new(tool_context(&settings, &orchestrator));

    let conversation = Arc::new(Conversation::new(settings.system_prompt.clone()));
    let deps = SessionDeps { orchestrator, tool_context, tts_client, sample_rate: settings.audio.output_sample_rate };
    let (tx_utterance, mut rx_audio) = spawn_session(&settings.wake_word, conversation.clone(), deps)?;

    let capture = CpalCapture::new(&settings.audio)?;
    let mut playback = CpalPlayback::new(&settings.audio)?;
    let cancel = CancellationToken::new();

    let (tx_chunk, mut rx_chunk) = tokio::sync::mpsc::channel(vui::pipeline::capacity::TRANSCRIPTION_TO_GATE);
    let capture_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { capture.run(tx_chunk, cancel).await }
    });

    let segmenter_task = tokio::spawn({
        let audio_config = settings.audio.clone();
        let stt_client = stt_client.clone();
        async move {
            let vad = EnergyVad::new(&audio_config);
            let mut accumulator = SegmentAccumulator::new(vad, HANGOVER_CHUNKS);
            while let Some(chunk) = rx_chunk.recv().await {
                let Some(segment) = accumulator.push(chunk) else { continue };
                match stt_client.transcribe(encode_segment_wav(&segment.samples, segment.sample_rate)).await {
                    Ok(text) if !text.trim().is_empty() => {
                        if tx_utterance.send(vui::pipeline::messages::UserUtterance { text }).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "transcription failed, dropping segment"),
                }
            }
        }
    });

    let playback_task = tokio::spawn(async move {
        while let Some(msg) = rx_audio.recv().await {
            if let Ok(samples) = vui::broadcast::wav::decode_pcm16(&msg.wave_data) {
                let floats: Vec<f32> = samples.iter().map(|s| f32::from(*s) / f32::from(i16::MAX)).collect();
                if let Err(e) = playback.play(&floats).await {
                    tracing::warn!(error = %e, "playback failed");
                }
            }
        }
    });

    tracing::info!(wake_word = %settings.wake_word, "chat session started, say the wake word to begin");
    tokio::signal::ctrl_c().await.map_err(VuiError::Io)?;
    cancel.cancel();
    let _ = tokio::join!(capture_task, segmenter_task, playback_task);
    Ok(())
}

fn encode_segment_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec { channels: 1, sample_rate, bits_per_sample: 16, sample_format: hound::SampleFormat::Int };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("in-memory WAV writer");
        for s in samples {
            let clamped = (*s * f32::from(i16::MAX)).clamp(f32::from(i16::MIN), f32::from(i16::MAX));
            writer.write_sample(clamped as i16).expect("write sample to in-memory WAV");
        }
        writer.finalize().expect("finalize in-memory WAV");
    }
    cursor.into_inner()
}

/// The HTTP/WebSocket broadcast server: one wake-word-gated session per
/// channel id, audio in/out over HTTP or WebSocket, optional TLS.
async fn run_serve(settings: Arc<Settings>) -> vui::Result<()> {
    if settings.wake_word.is_empty() {
        return Err(VuiError::FatalStartup("wake word must be configured (--wake-word or config file)".into()));
    }

    let stt_client = Arc::new(SttClient::new(settings.server_url.clone(), settings.stt_model.clone()));

    let factory_settings = settings.clone();
    let registry = Arc::new(ChannelRegistry::new(Arc::new(move || {
        let chat_client = Arc::new(ChatClient::new(factory_settings.server_url.clone(), factory_settings.api_key.clone()));
        let tts_client = Arc::new(TtsClient::new(factory_settings.server_url.clone(), factory_settings.tts_model.clone(), factory_settings.api_key.clone()));
        let orchestrator = build_orchestrator(&factory_settings, chat_client);
        let tool_context = Arc::new(tool_context(&factory_settings, &orchestrator));
        let conversation = Arc::new(Conversation::new(factory_settings.system_prompt.clone()));
        ChannelBlueprint {
            wake_word: factory_settings.wake_word.clone(),
            conversation,
            deps: SessionDeps { orchestrator, tool_context, tts_client, sample_rate: factory_settings.audio.output_sample_rate },
        }
    })));

    let app_state = AppState { registry, stt_client };
    let router = build_router(app_state, settings.web_dir.clone());

    let addr: std::net::SocketAddr = settings.listen.parse().map_err(|e| VuiError::FatalStartup(format!("invalid --listen address {:?}: {e}", settings.listen)))?;

    if settings.tls_cert.is_some() || settings.tls_key.is_some() {
        let (Some(cert), Some(key)) = (&settings.tls_cert, &settings.tls_key) else {
            return Err(VuiError::FatalStartup("both --tls-cert and --tls-key are required to serve over TLS".into()));
        };
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key)
            .await
            .map_err(|e| VuiError::FatalStartup(format!("load TLS material: {e}")))?;
        tracing::info!(%addr, "serving over TLS");
        axum_server::bind_rustls(addr, tls_config).serve(router.into_make_service()).await.map_err(VuiError::Io)?;
    } else {
        tracing::info!(%addr, "serving");
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(VuiError::Io)?;
        axum::serve(listener, router).await.map_err(VuiError::Io)?;
    }

    Ok(())
}
