//! Communication channels (Telegram).
//!
//! Inbound events are handed to the dispatcher; replies go out through the `Transport` trait.

mod inbound;
mod telegram;
mod transport;

pub use inbound::{ConversationId, InboundEvent, UserId};
pub use telegram::{TelegramChannel, TelegramUpdate};
pub use transport::{ParseMode, ProgressSignal, SendOptions, Transport, TransportError};
