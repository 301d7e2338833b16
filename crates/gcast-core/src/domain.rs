/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// A chat the bot broadcasts into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub chat_id: ChatId,
    /// `@handle` of the chat, or the stringified chat id when it has none.
    pub username: String,
}

impl Group {
    pub fn new(chat_id: ChatId, handle: Option<&str>) -> Self {
        let username = handle
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(|h| h.trim_start_matches('@').to_string())
            .unwrap_or_else(|| chat_id.0.to_string());
        Self { chat_id, username }
    }
}

/// A URL button attached to a broadcast message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Button {
    pub name: String,
    pub link: String,
}

/// A message as persisted in the store, with its file and buttons.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredMessage {
    pub msg_id: i64,
    pub text: String,
    /// Local path, URL or Telegram file id.
    pub file_link: String,
    pub buttons: Vec<Button>,
}

/// A message about to be inserted; the store assigns its id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMessage {
    pub text: String,
    pub file_link: String,
    pub buttons: Vec<Button>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_label_falls_back_to_chat_id() {
        assert_eq!(Group::new(ChatId(-100123), None).username, "-100123");
        assert_eq!(Group::new(ChatId(-100123), Some("  ")).username, "-100123");
        assert_eq!(Group::new(ChatId(-1), Some("@news")).username, "news");
    }
}
