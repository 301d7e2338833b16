use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use gcast_core::messaging::throttled::{ThrottleConfig, ThrottledMessenger};
use gcast_core::{
    config::Config, context::AppContext, conversation::Conversation,
    messaging::port::MessagingPort,
};

use crate::handlers;
use crate::TelegramMessenger;

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(bot = %me.username(), "gcast started"),
        Err(e) => tracing::warn!("could not fetch bot identity: {e}"),
    }
    tracing::info!(
        admins = cfg.admin_ids.len(),
        language = %cfg.language,
        database = %cfg.database_path.display(),
        max_groups = cfg.max_groups,
        interval_secs = cfg.default_interval_secs,
        "configuration loaded"
    );

    // Broadcast sweeps are bursty; throttle here and keep one RetryAfter retry in the adapter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let app = Arc::new(AppContext::new(cfg.clone(), messenger)?);
    tracing::info!(
        groups = app.groups.count().await?,
        messages = app.messages.count().await?,
        "store opened"
    );
    let conversation = Arc::new(Conversation::new(app.clone()));

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_my_chat_member().endpoint(handlers::handle_my_chat_member));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![conversation])
        .build()
        .dispatch()
        .await;

    if let Some(handle) = app.broadcaster.stop().await {
        let _ = handle.await;
    }
    tracing::info!("gcast stopped");
    Ok(())
}
