use std::path::Path;

use async_trait::async_trait;

use crate::{
    domain::ChatId,
    messaging::types::{BroadcastPost, MediaRef, ReplyKeyboard},
    Result,
};

/// Outbound side of the messenger.
///
/// Telegram is the only implementation; the core never sees teloxide types.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    /// Plain text, optionally replacing the chat's reply keyboard.
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<ReplyKeyboard>,
    ) -> Result<()>;

    /// Attachment + caption + URL button grid.
    async fn send_post(&self, chat_id: ChatId, post: &BroadcastPost) -> Result<()>;

    /// Fetch an inbound attachment into `dest`.
    async fn download_media(&self, media: &MediaRef, dest: &Path) -> Result<()>;
}
