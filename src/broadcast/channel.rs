//! Per-channel subscriber fan-out: one conversation, one wake-word-gated
//! utterance inlet, and any number of audio subscribers listening for its
//! synthesized replies.
//!
//! Grounded in `internal/broadcast/channel.go`'s `Channel.Publish`: iterate
//! subscribers, send with a bounded timeout, drop (and log) whichever
//! subscriber didn't keep up rather than stall the whole channel on one slow
//! listener.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;

use crate::conversation::Conversation;
use crate::error::{Result, VuiError};
use crate::pipeline::capacity;
use crate::pipeline::messages::{AudioMessage, UserUtterance};
use crate::pipeline::session::{spawn_session, SessionDeps};

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(20);

struct Subscription {
    id: Uuid,
    tx: mpsc::Sender<AudioMessage>,
}

/// One conversation's audio fan-out: subscribers receive every
/// [`AudioMessage`] the session produces, in order, independently of each
/// other's pace.
pub struct Channel {
    id: String,
    conversation: Arc<Conversation>,
    utterance_tx: mpsc::Sender<UserUtterance>,
    subscriptions: RwLock<Vec<Subscription>>,
}

impl Channel {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn conversation(&self) -> &Arc<Conversation> {
        &self.conversation
    }

    /// Feed a transcribed utterance into this channel's session (subject to
    /// the wake-word gate downstream).
    pub async fn send_utterance(&self, text: String) -> Result<()> {
        self.utterance_tx.send(UserUtterance { text }).await.map_err(|_| VuiError::Cancelled)
    }

    /// Register a new subscriber, returning its id (for later
    /// [`Channel::unsubscribe`]) and the receiving half of its audio queue.
    pub async fn subscribe(&self) -> (Uuid, mpsc::Receiver<AudioMessage>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(capacity::BROADCAST_SUBSCRIPTION);
        self.subscriptions.write().await.push(Subscription { id, tx });
        tracing::info!(channel = %self.id, subscriber = %id, "subscriber joined");
        (id, rx)
    }

    pub async fn unsubscribe(&self, id: Uuid) {
        self.subscriptions.write().await.retain(|s| s.id != id);
        tracing::info!(channel = %self.id, subscriber = %id, "subscriber left");
    }

    /// Deliver `msg` to every current subscriber, each bounded by
    /// [`PUBLISH_TIMEOUT`]; a subscriber that times out or has hung up is
    /// dropped rather than allowed to stall the others.
    async fn publish(&self, msg: AudioMessage) {
        let subs = self.subscriptions.read().await;
        if subs.is_empty() {
            return;
        }
        let mut dead = Vec::new();
        for sub in subs.iter() {
            match tokio::time::timeout(PUBLISH_TIMEOUT, sub.tx.send(msg.clone())).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => dead.push(sub.id),
                Err(_elapsed) => {
                    let bt = std::backtrace::Backtrace::force_capture();
                    tracing::warn!(channel = %self.id, subscriber = %sub.id, backtrace = %bt, "subscriber did not keep up within 20s, dropping");
                    dead.push(sub.id);
                }
            }
        }
        drop(subs);
        if !dead.is_empty() {
            self.subscriptions.write().await.retain(|s| !dead.contains(&s.id));
        }
    }
}

/// Everything needed to spin up a brand-new [`Channel`]: its wake word, a
/// freshly seeded conversation, and the shared orchestration dependencies.
pub struct ChannelBlueprint {
    pub wake_word: String,
    pub conversation: Arc<Conversation>,
    pub deps: SessionDeps,
}

pub type SessionFactory = Arc<dyn Fn() -> ChannelBlueprint + Send + Sync>;

/// On-demand channel creation and lookup, keyed by the caller-chosen channel
/// id in the URL path (e.g. `/channels/{id}/audio`). Grounded in
/// `internal/broadcast/registry.go`'s `Registry.GetOrCreate`.
pub struct ChannelRegistry {
    channels: Mutex<HashMap<String, Arc<Channel>>>,
    factory: SessionFactory,
}

impl ChannelRegistry {
    #[must_use]
    pub fn new(factory: SessionFactory) -> Self {
        ChannelRegistry { channels: Mutex::new(HashMap::new()), factory }
    }

    /// Return the existing channel for `id`, or build and spawn a new
    /// session for it.
    pub async fn get_or_create(&self, id: &str) -> Result<Arc<Channel>> {
        let mut channels = self.channels.lock().await;
        if let Some(existing) = channels.get(id) {
            return Ok(existing.clone());
        }

        let blueprint = (self.factory)();
        let (utterance_tx, mut audio_rx) = spawn_session(&blueprint.wake_word, blueprint.conversation.clone(), blueprint.deps)?;

        let channel = Arc::new(Channel {
            id: id.to_string(),
            conversation: blueprint.conversation,
            utterance_tx,
            subscriptions: RwLock::new(Vec::new()),
        });

        let forwarder = channel.clone();
        tokio::spawn(async move {
            while let Some(msg) = audio_rx.recv().await {
                forwarder.publish(msg).await;
            }
        });

        channels.insert(id.to_string(), channel.clone());
        tracing::info!(channel = %id, "channel created");
        Ok(channel)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Channel>> {
        self.channels.lock().await.get(id).cloned()
    }
}
