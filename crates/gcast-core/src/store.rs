//! SQLite persistence.
//!
//! Every unit of work opens its own connection, runs inside a transaction,
//! commits and closes. Nothing is held open between admin requests.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use rusqlite::{Connection, Transaction};

use crate::{errors::Error, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS groups (
    id INTEGER NOT NULL UNIQUE,
    username TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS messages (
    text TEXT NOT NULL,
    msg_id INTEGER NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS buttons (
    name TEXT NOT NULL,
    link TEXT NOT NULL,
    msg_id INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS message_files (
    file_link TEXT NOT NULL,
    msg_id INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS sequences (
    name TEXT PRIMARY KEY,
    next INTEGER NOT NULL
);
";

#[derive(Clone, Debug)]
pub struct Store {
    path: Arc<PathBuf>,
}

impl Store {
    /// Open (and migrate) the database file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let conn = Connection::open(&path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run one unit of work on the blocking pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = Connection::open(path.as_path())?;
            let tx = conn.transaction()?;
            let out = f(&tx)?;
            tx.commit()?;
            Ok(out)
        })
        .await
        .map_err(|e| Error::External(format!("store task failed: {e}")))?
    }
}

#[cfg(test)]
pub(crate) fn tmp_db(prefix: &str) -> Store {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let pid = std::process::id();
    let path = PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}-{n}.db"));
    let _ = std::fs::remove_file(&path);
    Store::open(path).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_is_idempotent_and_work_commits() {
        let store = tmp_db("gcast-store");
        let reopened = Store::open(store.path().to_path_buf()).unwrap();

        store
            .run(|tx| {
                tx.execute("INSERT INTO groups (id, username) VALUES (1, 'a')", [])?;
                Ok(())
            })
            .await
            .unwrap();

        let n: i64 = reopened
            .run(|tx| Ok(tx.query_row("SELECT COUNT(*) FROM groups", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn failed_work_is_rolled_back() {
        let store = tmp_db("gcast-store-rollback");
        let res: Result<()> = store
            .run(|tx| {
                tx.execute("INSERT INTO groups (id, username) VALUES (7, 'x')", [])?;
                Err(Error::Batch("boom".to_string()))
            })
            .await;
        assert!(res.is_err());

        let n: i64 = store
            .run(|tx| Ok(tx.query_row("SELECT COUNT(*) FROM groups", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(n, 0);
    }
}
