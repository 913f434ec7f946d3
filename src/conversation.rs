//! Conversation history with derived partitions

use crate::llm::{Message, Role};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Ordered message sequence.
///
/// The user-authored partition is recomputed after every merge and handed to
/// tools as a shared read-only snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Message>", into = "Vec<Message>")]
pub struct Conversation {
    messages: Vec<Message>,
    user_messages: Arc<[Message]>,
}

impl Conversation {
    pub fn new(messages: Vec<Message>) -> Self {
        let mut conversation = Self {
            messages,
            user_messages: Arc::from(Vec::new()),
        };
        conversation.repartition();
        conversation
    }

    /// Append messages in order and refresh partitions
    pub fn merge(&mut self, messages: impl IntoIterator<Item = Message>) {
        let before = self.messages.len();
        self.messages.extend(messages);
        if self.messages.len() != before {
            self.repartition();
        }
    }

    pub fn push(&mut self, message: Message) {
        self.merge(std::iter::once(message));
    }

    fn repartition(&mut self) {
        self.user_messages = self
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .cloned()
            .collect();
    }

    /// All messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// User-authored messages
    pub fn user_messages(&self) -> &[Message] {
        &self.user_messages
    }

    /// Shared snapshot of the user-authored partition
    pub fn user_snapshot(&self) -> Arc<[Message]> {
        Arc::clone(&self.user_messages)
    }

    /// Non-user-authored messages (system, assistant, tool)
    pub fn response_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role != Role::User)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

impl From<Vec<Message>> for Conversation {
    fn from(messages: Vec<Message>) -> Self {
        Self::new(messages)
    }
}

impl From<Conversation> for Vec<Message> {
    fn from(conversation: Conversation) -> Self {
        conversation.messages
    }
}

impl PartialEq for Conversation {
    fn eq(&self, other: &Self) -> bool {
        self.messages == other.messages
    }
}
