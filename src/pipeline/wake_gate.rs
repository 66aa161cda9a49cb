//! Wake-word gate: forwards only utterances that mention the configured
//! wake word as a standalone, case-insensitive word. Stateless beyond the
//! compiled pattern.
//!
//! Grounded in `internal/wakeword/wakeword.go`'s `Filter.FilterByWakeWord`:
//! same `(?i)(^|[^\w])<word>($|[^\w])` boundary regex, same log-the-rest
//! behavior.

use regex::Regex;
use tokio::sync::mpsc;

use crate::error::{Result, VuiError};
use crate::pipeline::messages::UserUtterance;

pub struct WakeWordGate {
    pattern: Regex,
}

impl WakeWordGate {
    pub fn new(wake_word: &str) -> Result<Self> {
        if wake_word.is_empty() {
            return Err(VuiError::Config("wake word must not be empty".into()));
        }
        let pattern = Regex::new(&format!(r"(?i)(^|[^\w]){}($|[^\w])", regex::escape(wake_word)))
            .map_err(|e| VuiError::Config(format!("compile wake word regex: {e}")))?;
        Ok(WakeWordGate { pattern })
    }

    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// Run the gate as a stage: read utterances, forward the matches, log
    /// and drop the rest.
    pub async fn run(self, mut input: mpsc::Receiver<UserUtterance>, output: mpsc::Sender<UserUtterance>) {
        while let Some(utterance) = input.recv().await {
            if self.matches(&utterance.text) {
                if output.send(utterance).await.is_err() {
                    break;
                }
            } else {
                tracing::info!(text = %utterance.text, "user (no wake word, dropped)");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> WakeWordGate {
        WakeWordGate::new("Computer").unwrap()
    }

    #[test]
    fn plain_greeting_without_wake_word_does_not_match() {
        assert!(!gate().matches("Hello there."));
    }

    #[test]
    fn wake_word_mid_sentence_matches() {
        assert!(gate().matches("Hey Computer, what's the time?"));
    }

    #[test]
    fn wake_word_matches_case_insensitively() {
        assert!(gate().matches("computer help"));
    }

    #[test]
    fn wake_word_as_substring_of_another_word_does_not_match() {
        assert!(!gate().matches("Computerized systems are everywhere."));
    }

    #[tokio::test]
    async fn e1_exactly_two_of_three_utterances_are_forwarded() {
        let gate = gate();
        let (tx_in, rx_in) = tokio::sync::mpsc::channel(8);
        let (tx_out, mut rx_out) = tokio::sync::mpsc::channel(8);

        tokio::spawn(gate.run(rx_in, tx_out));

        for text in ["Hello there.", "Hey Computer, what's the time?", "computer help"] {
            tx_in.send(UserUtterance { text: text.to_string() }).await.unwrap();
        }
        drop(tx_in);

        let mut forwarded = Vec::new();
        while let Some(u) = rx_out.recv().await {
            forwarded.push(u.text);
        }
        assert_eq!(forwarded, vec!["Hey Computer, what's the time?", "computer help"]);
    }
}
