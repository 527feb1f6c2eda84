use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Config, MessageId, PartyId, Snapshot, UserId};

/// A chat message in a party
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Assigned by the server when the message is stored.
    /// Messages appended optimistically by the sender don't have one yet.
    #[serde(default)]
    pub id: Option<MessageId>,
    pub party_id: PartyId,
    /// The content of the message
    pub message: String,
    pub user_id: UserId,
    pub username: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Returns true if `other` is another delivery of this message.
    pub fn is_duplicate_of(&self, other: &ChatMessage, window: Duration) -> bool {
        if let (Some(a), Some(b)) = (self.id, other.id) {
            if a == b {
                return true;
            }
        }

        let distance = (self.timestamp - other.timestamp).abs();

        self.user_id == other.user_id && self.message == other.message && distance < window
    }
}

/// What happened when a message was delivered to [ChatHistory]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Appended,
    /// The message was already held. If the held copy had no id it now carries the delivered one
    Duplicate,
}

/// The live view of a party's chat, holding the most recent messages in receipt order.
#[derive(Debug)]
pub struct ChatHistory {
    limit: usize,
    window: Duration,
    messages: Snapshot<ChatMessage>,
}

impl ChatHistory {
    pub fn new(config: &Config) -> Self {
        Self {
            limit: config.chat_history_limit,
            window: config.chat_dedup_window(),
            messages: Default::default(),
        }
    }

    /// Delivers a message, dropping it if it is a duplicate of one already held.
    pub fn deliver(&self, message: ChatMessage) -> Delivery {
        let window = self.window;
        let limit = self.limit;

        self.messages.update(move |messages| {
            let held = messages
                .iter_mut()
                .find(|m| m.is_duplicate_of(&message, window));

            if let Some(held) = held {
                if held.id.is_none() {
                    held.id = message.id;
                }

                return Delivery::Duplicate;
            }

            messages.push(message);

            if messages.len() > limit {
                let overflow = messages.len() - limit;
                messages.drain(..overflow);
            }

            Delivery::Appended
        })
    }

    /// Replaces the view with a page of history fetched from the server.
    /// Messages that arrived live in the meantime are kept.
    pub fn load(&self, history: Vec<ChatMessage>) {
        let live = self.snapshot();
        self.messages.update(|messages| messages.clear());

        for message in history.into_iter().chain(live.iter().cloned()) {
            self.deliver(message);
        }
    }

    /// Returns the current messages, oldest first
    pub fn snapshot(&self) -> Arc<Vec<ChatMessage>> {
        self.messages.get()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
