//! Speech-to-text HTTP client: multipart upload of WAV audio to an
//! OpenAI-compatible `/v1/audio/transcriptions` endpoint.
//!
//! Grounded in `internal/stt/sttclient.go`'s `Client.Transcribe`.

use reqwest::multipart;
use serde::Deserialize;

use crate::error::{Result, VuiError};

pub struct SttClient {
    http: reqwest::Client,
    server_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl SttClient {
    #[must_use]
    pub fn new(server_url: impl Into<String>, model: impl Into<String>) -> Self {
        SttClient { http: reqwest::Client::new(), server_url: server_url.into(), model: model.into() }
    }

    pub async fn transcribe(&self, wav_data: Vec<u8>) -> Result<String> {
        let part = multipart::Part::bytes(wav_data).file_name("input.wav");
        let form = multipart::Form::new().part("file", part).text("model", self.model.clone());

        let response = self
            .http
            .post(format!("{}/v1/audio/transcriptions", self.server_url))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        let parsed: TranscriptionResponse =
            response.json().await.map_err(|e| VuiError::Schema(format!("parse transcription response: {e}")))?;
        Ok(parsed.text)
    }
}
