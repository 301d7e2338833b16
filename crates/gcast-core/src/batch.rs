//! JSON batch ingestion.
//!
//! Format:
//!
//! ```json
//! {"messages": [{"text": ["line 1", "line 2"], "file": "files/a.jpg",
//!                "buttons": [{"name": "Site", "link": "https://example.com"}]}]}
//! ```

use serde::Deserialize;

use crate::{
    domain::{Button, NewMessage},
    errors::Error,
    Result,
};

#[derive(Debug, Deserialize)]
struct BatchFile {
    messages: Vec<BatchMessage>,
}

#[derive(Debug, Deserialize)]
struct BatchMessage {
    text: Vec<String>,
    file: String,
    #[serde(default)]
    buttons: Vec<BatchButton>,
}

#[derive(Debug, Deserialize)]
struct BatchButton {
    name: String,
    link: String,
}

/// Parse an uploaded batch. Nothing is returned unless every entry is well formed.
pub fn parse_batch(bytes: &[u8]) -> Result<Vec<NewMessage>> {
    let file: BatchFile = serde_json::from_slice(bytes)?;
    if file.messages.is_empty() {
        return Err(Error::Batch("batch contains no messages".to_string()));
    }

    file.messages
        .into_iter()
        .enumerate()
        .map(|(i, m)| {
            if m.file.trim().is_empty() {
                return Err(Error::Batch(format!("message #{} has an empty file", i + 1)));
            }
            Ok(NewMessage {
                text: m.text.join("\n"),
                file_link: m.file,
                buttons: m
                    .buttons
                    .into_iter()
                    .map(|b| Button {
                        name: b.name,
                        link: b.link,
                    })
                    .collect(),
            })
        })
        .collect()
}
