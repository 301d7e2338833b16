use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::ChatId,
    messaging::{
        port::MessagingPort,
        types::{BroadcastPost, MediaRef, ReplyKeyboard},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* Telegram API calls (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between calls per chat (Telegram group limits are ~20 msg/min).
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_chat_min_interval: Duration::from_millis(1050), // ~0.95/sec
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// MessagingPort decorator that spaces outbound calls.
///
/// A broadcast sweep fans every message out to every group back to back; this keeps
/// the sweep under Telegram's flood limits instead of collecting 429s.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<i64, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_chat(&self, chat_id: i64) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_chat.lock().await;
        map.entry(chat_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_chat_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle_chat(&self, chat_id: i64) {
        let global_wait = { self.global.lock().await.reserve() };
        let chat_wait = {
            let lim = self.limiter_for_chat(chat_id).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(chat_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    async fn throttle_global(&self) {
        let wait = { self.global.lock().await.reserve() };
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<ReplyKeyboard>,
    ) -> Result<()> {
        self.throttle_chat(chat_id.0).await;
        self.inner.send_text(chat_id, text, keyboard).await
    }

    async fn send_post(&self, chat_id: ChatId, post: &BroadcastPost) -> Result<()> {
        self.throttle_chat(chat_id.0).await;
        self.inner.send_post(chat_id, post).await
    }

    async fn download_media(&self, media: &MediaRef, dest: &Path) -> Result<()> {
        // Not tied to a chat; apply global throttling only.
        self.throttle_global().await;
        self.inner.download_media(media, dest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullMessenger;

    #[async_trait::async_trait]
    impl MessagingPort for NullMessenger {
        async fn send_text(&self, _: ChatId, _: &str, _: Option<ReplyKeyboard>) -> Result<()> {
            Ok(())
        }

        async fn send_post(&self, _: ChatId, _: &BroadcastPost) -> Result<()> {
            Ok(())
        }

        async fn download_media(&self, _: &MediaRef, _: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn same_chat_calls_are_spaced_other_chats_are_not() {
        let messenger = ThrottledMessenger::new(Arc::new(NullMessenger), ThrottleConfig::default());
        let started = Instant::now();

        messenger.send_text(ChatId(1), "a", None).await.unwrap();
        messenger.send_text(ChatId(2), "b", None).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));

        messenger.send_text(ChatId(1), "c", None).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(1050));
    }
}
