use std::sync::Arc;

use gcast_core::config::Config;

#[tokio::main]
async fn main() -> Result<(), gcast_core::Error> {
    gcast_core::logging::init("gcast")?;

    let cfg = Arc::new(Config::load()?);

    gcast_telegram::router::run_polling(cfg)
        .await
        .map_err(|e| gcast_core::Error::External(format!("telegram bot failed: {e:#}")))?;

    Ok(())
}
