//! Text-to-speech HTTP client: posts the sentence to synthesize to an
//! OpenAI-compatible `/v1/audio/speech` endpoint and returns the raw audio
//! bytes (WAV) it responds with.
//!
//! Grounded in `internal/tts/ttsclient.go`'s `Client.GenerateAudio`.

use serde_json::json;

use crate::error::Result;

pub struct TtsClient {
    http: reqwest::Client,
    server_url: String,
    model: String,
    api_key: String,
}

impl TtsClient {
    #[must_use]
    pub fn new(server_url: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        TtsClient { http: reqwest::Client::new(), server_url: server_url.into(), model: model.into(), api_key: api_key.into() }
    }

    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let mut request = self
            .http
            .post(format!("{}/v1/audio/speech", self.server_url))
            .json(&json!({"input": text, "model": self.model}));

        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}
