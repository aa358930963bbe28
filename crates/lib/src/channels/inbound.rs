//! Inbound event from a channel: delivered to the dispatcher, which hands it to the worker
//! serving its conversation.

/// Chat identifier on the transport side (e.g. Telegram chat_id). Stable for the conversation's lifetime.
pub type ConversationId = i64;

/// Identifier of the user who sent an event (e.g. Telegram `from.id`).
pub type UserId = i64;

/// One message received from a channel. Never mutated after it is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    /// Message text, or the caption when the message carries a photo.
    pub text: Option<String>,
    /// Transport file reference of the attached image (e.g. Telegram file_id).
    pub image: Option<String>,
    /// True when the message starts with a bot command (e.g. `/image`).
    pub is_command: bool,
}

impl InboundEvent {
    /// Plain text message (not a command).
    pub fn text(conversation_id: ConversationId, sender_id: UserId, text: impl Into<String>) -> Self {
        Self {
            conversation_id,
            sender_id,
            text: Some(text.into()),
            image: None,
            is_command: false,
        }
    }

    /// Command message; `text` is the full command line including the leading `/`.
    pub fn command(conversation_id: ConversationId, sender_id: UserId, text: impl Into<String>) -> Self {
        Self {
            is_command: true,
            ..Self::text(conversation_id, sender_id, text)
        }
    }

    /// True when the event carries neither text nor an image.
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.image.is_none()
    }
}
