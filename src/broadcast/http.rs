//! The broadcast surface's HTTP/WebSocket routes: audio in via `POST` or a
//! WebSocket binary frame, audio out via a streamed `GET` response or the
//! same WebSocket connection, plus static file serving for a browser client.
//!
//! Grounded in `swedishembedded-sven/crates/sven-gateway/src/http/ws.rs`'s
//! `ws_handler`/`handle_socket` (`tokio::select!` between the socket and a
//! broadcast receiver) — adapted here from JSON command frames to binary
//! audio frames, since no server-side audio-over-WebSocket precedent exists
//! in the teacher itself.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tower_http::services::ServeDir;

use crate::broadcast::channel::ChannelRegistry;
use crate::broadcast::stream::{audio_byte_stream, OutputMode, DEFAULT_BUFFER_MS};
use crate::broadcast::wav::decode_pcm16;
use crate::clients::stt::SttClient;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ChannelRegistry>,
    pub stt_client: Arc<SttClient>,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(rename = "buffer-ms")]
    buffer_ms: Option<u64>,
}

/// Build the full router: channel audio in/out, WebSocket bridging, and
/// (when `web_dir` is set) static file serving at `/`.
#[must_use]
pub fn build_router(state: AppState, web_dir: Option<std::path::PathBuf>) -> Router {
    let mut router = Router::new()
        .route("/channels/{id}/audio", post(post_audio).get(get_audio))
        .route("/channels/{id}/ws", get(ws_upgrade))
        .with_state(state);

    if let Some(dir) = web_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
}

/// `POST /channels/{id}/audio`: upload a complete WAV utterance, transcribe
/// it, and feed the text into the channel's wake-word-gated session.
async fn post_audio(Path(id): Path<String>, State(state): State<AppState>, body: axum::body::Bytes) -> Result<StatusCode, (StatusCode, String)> {
    let channel = state.registry.get_or_create(&id).await.map_err(internal_error)?;
    let text = state.stt_client.transcribe(body.to_vec()).await.map_err(internal_error)?;
    channel.send_utterance(text).await.map_err(internal_error)?;
    Ok(StatusCode::ACCEPTED)
}

/// `GET /channels/{id}/audio`: a long-lived streamed response of this
/// channel's synthesized replies, in WAV or raw-PCM framing depending on
/// `Accept`.
async fn get_audio(Path(id): Path<String>, State(state): State<AppState>, headers: HeaderMap, Query(query): Query<StreamQuery>) -> Response {
    let channel = match state.registry.get_or_create(&id).await {
        Ok(c) => c,
        Err(e) => return internal_error(e).into_response(),
    };
    let (_sub_id, rx) = channel.subscribe().await;

    let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());
    let mode = OutputMode::from_accept_header(accept);
    let buffer_ms = query.buffer_ms.unwrap_or(DEFAULT_BUFFER_MS);

    let body = axum::body::Body::from_stream(audio_byte_stream(rx, mode, buffer_ms));
    Response::builder().status(StatusCode::OK).header(header::CONTENT_TYPE, mode.content_type()).body(body).unwrap_or_else(|_| internal_error_response())
}

async fn ws_upgrade(Path(id): Path<String>, State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, id, state))
}

/// Bridge one WebSocket connection to a channel: binary frames in are
/// treated as complete WAV utterances and transcribed; binary frames out are
/// raw PCM decoded from the channel's synthesized [`crate::pipeline::messages::AudioMessage`]s.
async fn handle_socket(socket: WebSocket, channel_id: String, state: AppState) {
    let channel = match state.registry.get_or_create(&channel_id).await {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(channel = %channel_id, error = %e, "failed to open channel for websocket client");
            return;
        }
    };
    let (_sub_id, mut audio_rx) = channel.subscribe().await;
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Binary(bytes))) => {
                        match state.stt_client.transcribe(bytes.to_vec()).await {
                            Ok(text) if !text.trim().is_empty() => {
                                if channel.send_utterance(text).await.is_err() {
                                    break;
                                }
                            }
                            Ok(_) => {}
                            Err(e) => tracing::warn!(channel = %channel_id, error = %e, "transcription of websocket audio failed"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(channel = %channel_id, error = %e, "websocket read error");
                        break;
                    }
                }
            }
            outgoing = audio_rx.recv() => {
                match outgoing {
                    Some(msg) => {
                        match decode_pcm16(&msg.wave_data) {
                            Ok(samples) => {
                                let bytes = crate::broadcast::wav::samples_to_le_bytes(&samples);
                                if sink.send(Message::Binary(bytes.into())).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::warn!(channel = %channel_id, error = %e, "failed to decode synthesized audio for websocket delivery"),
                        }
                    }
                    None => break,
                }
            }
        }
    }

    tracing::info!(channel = %channel_id, "websocket client disconnected");
}

fn internal_error(e: crate::error::VuiError) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn internal_error_response() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "failed to build response").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_ms_query_defaults_when_absent() {
        let query: StreamQuery = serde_urlencoded::from_str("").unwrap();
        assert_eq!(query.buffer_ms, None);
    }

    #[test]
    fn buffer_ms_query_parses_explicit_value() {
        let query: StreamQuery = serde_urlencoded::from_str("buffer-ms=2000").unwrap();
        assert_eq!(query.buffer_ms, Some(2000));
    }
}
