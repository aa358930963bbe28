//! Conversation history kept between requests.
//!
//! Each dispatch worker owns its own `ContextStore` and is the only code that touches it,
//! so the store carries no synchronization. History is volatile and lost on restart.

use crate::channels::ConversationId;
use std::collections::HashMap;

/// Who said a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
    /// URL of an image attached to a user turn.
    pub image_url: Option<String>,
}

impl ContextMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            image_url: None,
        }
    }

    pub fn user_with_image(content: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            image_url: Some(image_url.into()),
            ..Self::user(content)
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            image_url: None,
        }
    }
}

/// Ordered message history per conversation. Append-only except for `clear`.
#[derive(Debug, Default)]
pub struct ContextStore {
    conversations: HashMap<ConversationId, Vec<ContextMessage>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, conversation_id: ConversationId, message: ContextMessage) {
        self.conversations
            .entry(conversation_id)
            .or_default()
            .push(message);
    }

    /// Copy of the history in insertion order; empty when the conversation has none.
    pub fn snapshot(&self, conversation_id: ConversationId) -> Vec<ContextMessage> {
        self.conversations
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Reset the history to empty. Clearing an unknown conversation is a no-op.
    pub fn clear(&mut self, conversation_id: ConversationId) {
        if let Some(messages) = self.conversations.get_mut(&conversation_id) {
            messages.clear();
        }
    }

    pub fn len(&self, conversation_id: ConversationId) -> usize {
        self.conversations
            .get(&conversation_id)
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self, conversation_id: ConversationId) -> bool {
        self.len(conversation_id) == 0
    }
}
