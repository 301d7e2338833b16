//! Telegram adapter (teloxide).
//!
//! This crate implements the `gcast-core` MessagingPort over Telegram Bot API.

use std::path::Path;

use async_trait::async_trait;

use teloxide::{
    net::Download,
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, KeyboardButton, KeyboardMarkup},
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use gcast_core::{
    domain::ChatId,
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{BroadcastPost, MediaRef, ReplyKeyboard, UrlButton},
    },
    utils::remove_file_quietly,
    Result,
};

/// Telegram rejects media captions longer than this.
const MAX_CAPTION_CHARS: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PostKind {
    Photo,
    Video,
    Animation,
    Audio,
    Document,
}

impl PostKind {
    /// Pick the send method from the attachment's extension; anything unknown goes as a document.
    fn of(file: &str) -> Self {
        let path = file.split(['?', '#']).next().unwrap_or(file);
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "webp" => PostKind::Photo,
            "mp4" | "mov" | "m4v" | "webm" | "mkv" | "avi" => PostKind::Video,
            "gif" => PostKind::Animation,
            "mp3" | "m4a" | "ogg" | "oga" | "wav" | "flac" => PostKind::Audio,
            _ => PostKind::Document,
        }
    }
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    /// URL, local file or (as a last resort) a file id already on Telegram's servers.
    fn input_file(file: &str) -> InputFile {
        if file.starts_with("http://") || file.starts_with("https://") {
            if let Ok(url) = reqwest::Url::parse(file) {
                return InputFile::url(url);
            }
        }
        if Path::new(file).is_file() {
            return InputFile::file(file);
        }
        InputFile::file_id(file)
    }

    fn reply_keyboard(keyboard: ReplyKeyboard) -> KeyboardMarkup {
        let rows: Vec<Vec<KeyboardButton>> = keyboard
            .rows
            .into_iter()
            .map(|row| row.into_iter().map(KeyboardButton::new).collect())
            .collect();
        KeyboardMarkup::new(rows).resize_keyboard(true)
    }

    fn url_buttons(grid: &[Vec<UrlButton>]) -> Result<Option<InlineKeyboardMarkup>> {
        if grid.is_empty() {
            return Ok(None);
        }
        let mut rows = Vec::with_capacity(grid.len());
        for row in grid {
            let mut buttons = Vec::with_capacity(row.len());
            for b in row {
                let url = reqwest::Url::parse(b.url.trim()).map_err(|e| {
                    Error::External(format!("invalid button link {:?}: {e}", b.url))
                })?;
                buttons.push(InlineKeyboardButton::url(b.label.clone(), url));
            }
            rows.push(buttons);
        }
        Ok(Some(InlineKeyboardMarkup::new(rows)))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<ReplyKeyboard>,
    ) -> Result<()> {
        let markup = keyboard.map(Self::reply_keyboard);
        self.with_retry(|| {
            let req = self.bot.send_message(Self::tg_chat(chat_id), text.to_string());
            match &markup {
                Some(m) => req.reply_markup(m.clone()),
                None => req,
            }
        })
        .await?;
        Ok(())
    }

    async fn send_post(&self, chat_id: ChatId, post: &BroadcastPost) -> Result<()> {
        let chat = Self::tg_chat(chat_id);
        let markup = Self::url_buttons(&post.buttons)?;
        let file = Self::input_file(&post.file);

        // An oversized caption goes out as a follow-up message carrying the buttons.
        let inline = post.text.chars().count() <= MAX_CAPTION_CHARS;
        let caption = inline.then(|| post.text.clone());
        let attached = if inline { markup.clone() } else { None };

        match PostKind::of(&post.file) {
            PostKind::Photo => {
                self.with_retry(|| {
                    let mut req = self.bot.send_photo(chat, file.clone());
                    if let Some(c) = &caption {
                        req = req.caption(c.clone());
                    }
                    if let Some(m) = &attached {
                        req = req.reply_markup(m.clone());
                    }
                    req
                })
                .await?;
            }
            PostKind::Video => {
                self.with_retry(|| {
                    let mut req = self.bot.send_video(chat, file.clone());
                    if let Some(c) = &caption {
                        req = req.caption(c.clone());
                    }
                    if let Some(m) = &attached {
                        req = req.reply_markup(m.clone());
                    }
                    req
                })
                .await?;
            }
            PostKind::Animation => {
                self.with_retry(|| {
                    let mut req = self.bot.send_animation(chat, file.clone());
                    if let Some(c) = &caption {
                        req = req.caption(c.clone());
                    }
                    if let Some(m) = &attached {
                        req = req.reply_markup(m.clone());
                    }
                    req
                })
                .await?;
            }
            PostKind::Audio => {
                self.with_retry(|| {
                    let mut req = self.bot.send_audio(chat, file.clone());
                    if let Some(c) = &caption {
                        req = req.caption(c.clone());
                    }
                    if let Some(m) = &attached {
                        req = req.reply_markup(m.clone());
                    }
                    req
                })
                .await?;
            }
            PostKind::Document => {
                self.with_retry(|| {
                    let mut req = self.bot.send_document(chat, file.clone());
                    if let Some(c) = &caption {
                        req = req.caption(c.clone());
                    }
                    if let Some(m) = &attached {
                        req = req.reply_markup(m.clone());
                    }
                    req
                })
                .await?;
            }
        }

        if !inline {
            self.with_retry(|| {
                let req = self.bot.send_message(chat, post.text.clone());
                match &markup {
                    Some(m) => req.reply_markup(m.clone()),
                    None => req,
                }
            })
            .await?;
        }
        Ok(())
    }

    async fn download_media(&self, media: &MediaRef, dest: &Path) -> Result<()> {
        let file = self
            .with_retry(|| self.bot.get_file(media.file_id.clone()))
            .await?;
        let mut dst = tokio::fs::File::create(dest).await?;
        if let Err(e) = self.bot.download_file(&file.path, &mut dst).await {
            drop(dst);
            remove_file_quietly(dest).await;
            return Err(Error::External(format!("telegram download failed: {e}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_kind_follows_extension() {
        assert_eq!(PostKind::of("files/abc.JPG"), PostKind::Photo);
        assert_eq!(PostKind::of("https://cdn.example.com/v.mp4?sig=1"), PostKind::Video);
        assert_eq!(PostKind::of("files/loop.gif"), PostKind::Animation);
        assert_eq!(PostKind::of("files/track.mp3"), PostKind::Audio);
        assert_eq!(PostKind::of("files/report.pdf"), PostKind::Document);
        assert_eq!(PostKind::of("AgACAgIAAxkBAAIBZ2"), PostKind::Document);
    }

    #[test]
    fn url_buttons_keep_the_grid_and_reject_bad_links() {
        let grid = vec![
            vec![
                UrlButton {
                    label: "a".to_string(),
                    url: "https://a.example.com".to_string(),
                },
                UrlButton {
                    label: "b".to_string(),
                    url: "https://b.example.com".to_string(),
                },
            ],
            vec![UrlButton {
                label: "c".to_string(),
                url: "https://c.example.com".to_string(),
            }],
        ];
        let markup = TelegramMessenger::url_buttons(&grid).unwrap().unwrap();
        let shape: Vec<_> = markup.inline_keyboard.iter().map(Vec::len).collect();
        assert_eq!(shape, vec![2, 1]);

        assert!(TelegramMessenger::url_buttons(&[]).unwrap().is_none());

        let bad = vec![vec![UrlButton {
            label: "x".to_string(),
            url: "not a link".to_string(),
        }]];
        assert!(TelegramMessenger::url_buttons(&bad).is_err());
    }
}
