//! In-memory messenger for unit tests.

use std::{collections::HashSet, path::Path, sync::Mutex, time::Duration};

use async_trait::async_trait;

use crate::{
    domain::ChatId,
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{BroadcastPost, MediaRef, ReplyKeyboard},
    },
    Result,
};

#[derive(Default)]
pub(crate) struct FakeMessenger {
    pub texts: Mutex<Vec<(ChatId, String, Option<ReplyKeyboard>)>>,
    pub posts: Mutex<Vec<(ChatId, BroadcastPost)>>,
    pub downloads: Mutex<Vec<MediaRef>>,
    /// Bytes written by `download_media`.
    pub payload: Mutex<Vec<u8>>,
    pub failing_chats: Mutex<HashSet<i64>>,
    /// Number of upcoming `send_text` calls to reject.
    pub text_failures: Mutex<usize>,
    /// Downloads write the payload and then report an error.
    pub failing_downloads: Mutex<bool>,
    pub post_delay: Option<Duration>,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_post_delay(delay: Duration) -> Self {
        Self {
            post_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn fail_for(&self, chat_id: i64) {
        self.failing_chats.lock().unwrap().insert(chat_id);
    }

    pub fn fail_next_texts(&self, n: usize) {
        *self.text_failures.lock().unwrap() = n;
    }

    pub fn fail_downloads(&self) {
        *self.failing_downloads.lock().unwrap() = true;
    }

    pub fn set_payload(&self, bytes: &[u8]) {
        *self.payload.lock().unwrap() = bytes.to_vec();
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    pub fn last_text(&self) -> Option<String> {
        self.texts.lock().unwrap().last().map(|(_, t, _)| t.clone())
    }

    pub fn last_keyboard(&self) -> Option<ReplyKeyboard> {
        self.texts
            .lock()
            .unwrap()
            .last()
            .and_then(|(_, _, k)| k.clone())
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<ReplyKeyboard>,
    ) -> Result<()> {
        {
            let mut pending = self.text_failures.lock().unwrap();
            if *pending > 0 {
                *pending -= 1;
                return Err(Error::External(format!("chat {} unreachable", chat_id.0)));
            }
        }
        self.texts
            .lock()
            .unwrap()
            .push((chat_id, text.to_string(), keyboard));
        Ok(())
    }

    async fn send_post(&self, chat_id: ChatId, post: &BroadcastPost) -> Result<()> {
        if let Some(delay) = self.post_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_chats.lock().unwrap().contains(&chat_id.0) {
            return Err(Error::External(format!("chat {} not found", chat_id.0)));
        }
        self.posts.lock().unwrap().push((chat_id, post.clone()));
        Ok(())
    }

    async fn download_media(&self, media: &MediaRef, dest: &Path) -> Result<()> {
        self.downloads.lock().unwrap().push(media.clone());
        let bytes = self.payload.lock().unwrap().clone();
        std::fs::write(dest, bytes)?;
        if *self.failing_downloads.lock().unwrap() {
            return Err(Error::External("download interrupted".to_string()));
        }
        Ok(())
    }
}
