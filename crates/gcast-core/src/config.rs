use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::{errors::Error, Result};

pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_MAX_GROUPS: usize = 10;

/// Typed configuration, read from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub admin_ids: Vec<i64>,

    // Texts
    pub language: String,
    pub text_catalog_path: Option<PathBuf>,

    // Storage
    pub database_path: PathBuf,
    pub files_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub error_log_path: PathBuf,

    // Broadcast
    pub default_interval_secs: u64,
    pub max_groups: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        let admin_ids = parse_csv_i64(env_str("TELEGRAM_ADMIN_IDS"));

        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }
        if admin_ids.is_empty() {
            return Err(Error::Config(
                "TELEGRAM_ADMIN_IDS environment variable is required".to_string(),
            ));
        }

        let language = env_str("BOT_LANGUAGE")
            .and_then(non_empty)
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_else(|| "en".to_string());
        let text_catalog_path = env_path("BOT_TEXT_PATH");

        let database_path = env_path("DATABASE_PATH").unwrap_or_else(|| "database.db".into());
        let files_dir = env_path("FILES_DIR").unwrap_or_else(|| "files".into());
        let uploads_dir = env_path("UPLOADS_DIR").unwrap_or_else(|| "uploads".into());
        let error_log_path = env_path("ERROR_LOG_PATH").unwrap_or_else(|| "log.txt".into());

        let default_interval_secs =
            env_u64("DEFAULT_INTERVAL_SECS").unwrap_or(DEFAULT_INTERVAL_SECS);
        let max_groups = env_usize("MAX_GROUPS").unwrap_or(DEFAULT_MAX_GROUPS);
        if max_groups == 0 {
            return Err(Error::Config("MAX_GROUPS must be at least 1".to_string()));
        }

        let cfg = Self {
            telegram_bot_token,
            admin_ids,
            language,
            text_catalog_path,
            database_path,
            files_dir,
            uploads_dir,
            error_log_path,
            default_interval_secs,
            max_groups,
        };
        cfg.ensure_dirs()?;
        Ok(cfg)
    }

    /// Create the working directories for downloaded media and uploaded batches.
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.files_dir)?;
        fs::create_dir_all(&self.uploads_dir)?;
        if let Some(parent) = self.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env_str(key).and_then(non_empty).map(PathBuf::from)
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
