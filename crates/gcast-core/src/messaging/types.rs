use crate::domain::{Button, StoredMessage};

/// Reply keyboard: each label sends itself back as a plain text message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplyKeyboard {
    pub rows: Vec<Vec<String>>,
}

impl ReplyKeyboard {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// Convenience for a single "back" row.
    pub fn single(label: impl Into<String>) -> Self {
        Self {
            rows: vec![vec![label.into()]],
        }
    }
}

/// URL button under a broadcast post.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlButton {
    pub label: String,
    pub url: String,
}

/// Fully rendered broadcast: caption, one attachment and a URL button grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BroadcastPost {
    pub text: String,
    /// Local path, URL or platform file id.
    pub file: String,
    pub buttons: Vec<Vec<UrlButton>>,
}

impl BroadcastPost {
    pub fn from_message(message: &StoredMessage) -> Self {
        Self {
            text: format!("{}\n(MESSAGE ID: {})", message.text, message.msg_id),
            file: message.file_link.clone(),
            buttons: button_grid(&message.buttons),
        }
    }
}

/// Lay buttons out two per row, in insertion order; an odd last button gets its own row.
pub fn button_grid(buttons: &[Button]) -> Vec<Vec<UrlButton>> {
    buttons
        .chunks(2)
        .map(|row| {
            row.iter()
                .map(|b| UrlButton {
                    label: b.name.clone(),
                    url: b.link.clone(),
                })
                .collect()
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    Animation,
    Audio,
    Voice,
    Document,
}

impl MediaKind {
    /// Extension used when the upload carries no file name.
    pub fn default_extension(self) -> &'static str {
        match self {
            MediaKind::Photo => "jpg",
            MediaKind::Video => "mp4",
            MediaKind::Animation => "mp4",
            MediaKind::Audio => "mp3",
            MediaKind::Voice => "ogg",
            MediaKind::Document => "bin",
        }
    }
}

/// Reference to an attachment on an inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaRef {
    pub file_id: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub kind: MediaKind,
}

impl MediaRef {
    pub fn is_json(&self) -> bool {
        if self.kind != MediaKind::Document {
            return false;
        }
        let mime_ok = self
            .mime_type
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("application/json"));
        let name_ok = self
            .file_name
            .as_deref()
            .is_some_and(|n| n.to_ascii_lowercase().ends_with(".json"));
        mime_ok || name_ok
    }
}
