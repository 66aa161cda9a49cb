//! Turn admitter: assigns each admitted utterance a `requestNum`, appends it
//! to the transcript (via `Conversation::admit_user_turn`, which also fires
//! cancellation and prunes), then emits a `ChatRequest` and a `ToneRequest`.
//!
//! Grounded in `internal/model/conversation.go`'s `AddUserRequest` plus the
//! `internal/vui/vui.go` wiring that turns its result into both a
//! completion request and a sound-generator notification.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::conversation::{Conversation, ContentPart};
use crate::pipeline::messages::{ChatRequest, ToneRequest, UserUtterance};

pub struct TurnAdmitter {
    conversation: Arc<Conversation>,
}

impl TurnAdmitter {
    #[must_use]
    pub fn new(conversation: Arc<Conversation>) -> Self {
        TurnAdmitter { conversation }
    }

    pub async fn run(
        self,
        mut input: mpsc::Receiver<UserUtterance>,
        chat_requests: mpsc::Sender<ChatRequest>,
        tone_requests: mpsc::Sender<ToneRequest>,
    ) {
        while let Some(utterance) = input.recv().await {
            let request_num = self.conversation.admit_user_turn(ContentPart::Text(utterance.text));
            if chat_requests.send(ChatRequest { request_num }).await.is_err() {
                break;
            }
            let _ = tone_requests.send(ToneRequest { request_num }).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn each_utterance_produces_one_chat_request_and_one_tone_request() {
        let conv = Arc::new(Conversation::new("sys"));
        let admitter = TurnAdmitter::new(conv.clone());
        let (tx_in, rx_in) = mpsc::channel(4);
        let (tx_chat, mut rx_chat) = mpsc::channel(4);
        let (tx_tone, mut rx_tone) = mpsc::channel(4);

        tokio::spawn(admitter.run(rx_in, tx_chat, tx_tone));

        tx_in.send(UserUtterance { text: "hello".into() }).await.unwrap();
        tx_in.send(UserUtterance { text: "again".into() }).await.unwrap();
        drop(tx_in);

        let first = rx_chat.recv().await.unwrap();
        let second = rx_chat.recv().await.unwrap();
        assert_eq!(first.request_num, 2);
        assert_eq!(second.request_num, 3);

        assert_eq!(rx_tone.recv().await.unwrap().request_num, 2);
        assert_eq!(rx_tone.recv().await.unwrap().request_num, 3);

        assert_eq!(conv.request_counter(), 3);
    }
}
