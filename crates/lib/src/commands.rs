//! Bot command classification: text of an inbound event -> `Command`.

use crate::channels::InboundEvent;

/// Commands understood by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    AddUser,
    Cancel,
    Image,
    SetModel,
    /// Looked like a command but is not one of ours.
    Unknown,
}

impl Command {
    fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "add_user" => Command::AddUser,
            "cancel" => Command::Cancel,
            "image" => Command::Image,
            "set_model" => Command::SetModel,
            _ => Command::Unknown,
        }
    }

    /// Commands advertised in the client's command menu, with descriptions.
    pub fn menu() -> &'static [(&'static str, &'static str)] {
        &[
            ("cancel", "Clear current conversation state"),
            ("image", "Generate image"),
            ("set_model", "Set model"),
        ]
    }
}

/// Classify an inbound event. None when the event is not a command (i.e. a chat message).
pub fn classify(event: &InboundEvent) -> Option<Command> {
    if !event.is_command {
        return None;
    }
    let text = event.text.as_deref().unwrap_or("");
    let token = text.split_whitespace().next().unwrap_or("");
    let Some(name) = token.strip_prefix('/') else {
        return Some(Command::Unknown);
    };
    // Group chats address commands as /image@SomeBot.
    let name = name.split('@').next().unwrap_or("");
    Some(Command::from_name(name))
}

/// Everything after the command token, trimmed. None when nothing follows.
pub fn command_argument(text: &str) -> Option<&str> {
    let text = text.trim_start();
    let rest = text
        .find(char::is_whitespace)
        .map(|i| text[i..].trim())
        .unwrap_or("");
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}
