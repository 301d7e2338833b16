use std::sync::Arc;

use crate::{
    broadcast::Broadcaster,
    catalog::Catalog,
    config::Config,
    domain::UserId,
    groups::GroupRegistry,
    interval::Interval,
    messages::MessageStore,
    messaging::port::MessagingPort,
    security::is_authorized,
    store::Store,
    utils::ErrorLog,
    Result,
};

/// Process-wide state shared by every handler.
pub struct AppContext {
    pub cfg: Arc<Config>,
    pub catalog: Arc<Catalog>,
    pub messenger: Arc<dyn MessagingPort>,
    pub messages: MessageStore,
    pub groups: GroupRegistry,
    pub interval: Arc<Interval>,
    pub broadcaster: Broadcaster,
    pub error_log: Arc<ErrorLog>,
}

impl AppContext {
    pub fn new(cfg: Arc<Config>, messenger: Arc<dyn MessagingPort>) -> Result<Self> {
        let catalog = Catalog::load(cfg.text_catalog_path.as_deref(), &cfg.language)?;
        let store = Store::open(cfg.database_path.clone())?;
        Ok(Self::with_parts(cfg, Arc::new(catalog), store, messenger))
    }

    pub fn with_parts(
        cfg: Arc<Config>,
        catalog: Arc<Catalog>,
        store: Store,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        let interval = Arc::new(Interval::new(cfg.default_interval_secs));
        let error_log = Arc::new(ErrorLog::new(cfg.error_log_path.clone()));
        let broadcaster = Broadcaster::new(messenger.clone(), interval.clone(), error_log.clone());

        Self {
            catalog,
            messages: MessageStore::new(store.clone()),
            groups: GroupRegistry::new(store, cfg.max_groups),
            interval,
            broadcaster,
            error_log,
            messenger,
            cfg,
        }
    }

    pub fn is_admin(&self, user_id: Option<UserId>) -> bool {
        is_authorized(user_id, &self.cfg.admin_ids)
    }
}

#[cfg(test)]
pub(crate) fn test_context(
    prefix: &str,
    messenger: Arc<dyn MessagingPort>,
) -> (Arc<AppContext>, std::path::PathBuf) {
    use crate::utils::tmp_file;

    let root = tmp_file(prefix, "d");
    let cfg = Config {
        telegram_bot_token: "test-token".to_string(),
        admin_ids: vec![1],
        language: "en".to_string(),
        text_catalog_path: None,
        database_path: root.join("database.db"),
        files_dir: root.join("files"),
        uploads_dir: root.join("uploads"),
        error_log_path: root.join("log.txt"),
        default_interval_secs: 60,
        max_groups: 10,
    };
    cfg.ensure_dirs().unwrap();
    let ctx = AppContext::new(Arc::new(cfg), messenger).unwrap();
    (Arc::new(ctx), root)
}
