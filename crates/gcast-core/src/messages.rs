use std::collections::HashMap;

use rusqlite::{params, OptionalExtension, Transaction};

use crate::{
    domain::{Button, NewMessage, StoredMessage},
    store::Store,
    Result,
};

const MSG_SEQUENCE: &str = "msg_id";

/// Broadcast messages with their attached file and buttons.
#[derive(Clone, Debug)]
pub struct MessageStore {
    store: Store,
}

impl MessageStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Persist one message and return its assigned id.
    pub async fn insert(&self, message: NewMessage) -> Result<i64> {
        self.store
            .run(move |tx| insert_one(tx, &message))
            .await
    }

    /// Persist a batch atomically: either every message is stored or none is.
    pub async fn insert_batch(&self, batch: Vec<NewMessage>) -> Result<Vec<i64>> {
        self.store
            .run(move |tx| batch.iter().map(|m| insert_one(tx, m)).collect())
            .await
    }

    /// Delete one message with its file and buttons.
    ///
    /// Returns the link of the detached file, or `None` if the id was unknown.
    pub async fn delete(&self, msg_id: i64) -> Result<Option<String>> {
        self.store
            .run(move |tx| {
                let file_link: Option<String> = tx
                    .query_row(
                        "SELECT file_link FROM message_files WHERE msg_id = ?1",
                        params![msg_id],
                        |r| r.get(0),
                    )
                    .optional()?;
                let n = tx.execute("DELETE FROM messages WHERE msg_id = ?1", params![msg_id])?;
                tx.execute("DELETE FROM buttons WHERE msg_id = ?1", params![msg_id])?;
                tx.execute(
                    "DELETE FROM message_files WHERE msg_id = ?1",
                    params![msg_id],
                )?;
                Ok(file_link.filter(|_| n > 0))
            })
            .await
    }

    /// Truncate every message table and restart numbering at 1. Returns the detached file links.
    pub async fn delete_all(&self) -> Result<Vec<String>> {
        self.store
            .run(|tx| {
                let mut file_links = Vec::new();
                {
                    let mut stmt = tx.prepare("SELECT file_link FROM message_files ORDER BY rowid")?;
                    let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
                    for row in rows {
                        file_links.push(row?);
                    }
                }
                tx.execute("DELETE FROM messages", [])?;
                tx.execute("DELETE FROM buttons", [])?;
                tx.execute("DELETE FROM message_files", [])?;
                tx.execute(
                    "DELETE FROM sequences WHERE name = ?1",
                    params![MSG_SEQUENCE],
                )?;
                Ok(file_links)
            })
            .await
    }

    pub async fn count(&self) -> Result<usize> {
        self.store
            .run(|tx| {
                let n: i64 = tx.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?;
                Ok(n as usize)
            })
            .await
    }

    /// All messages ordered by id, buttons in insertion order.
    pub async fn list(&self) -> Result<Vec<StoredMessage>> {
        self.store.run(list_all).await
    }
}

fn next_id(tx: &Transaction<'_>) -> Result<i64> {
    let stored: Option<i64> = tx
        .query_row(
            "SELECT next FROM sequences WHERE name = ?1",
            params![MSG_SEQUENCE],
            |r| r.get(0),
        )
        .optional()?;
    let id = match stored {
        Some(next) => next,
        // Databases created before the sequence table existed.
        None => tx.query_row("SELECT COALESCE(MAX(msg_id), 0) + 1 FROM messages", [], |r| {
            r.get(0)
        })?,
    };
    tx.execute(
        "INSERT INTO sequences (name, next) VALUES (?1, ?2)
         ON CONFLICT(name) DO UPDATE SET next = excluded.next",
        params![MSG_SEQUENCE, id + 1],
    )?;
    Ok(id)
}

fn insert_one(tx: &Transaction<'_>, message: &NewMessage) -> Result<i64> {
    let msg_id = next_id(tx)?;
    tx.execute(
        "INSERT INTO messages (text, msg_id) VALUES (?1, ?2)",
        params![message.text, msg_id],
    )?;
    tx.execute(
        "INSERT INTO message_files (file_link, msg_id) VALUES (?1, ?2)",
        params![message.file_link, msg_id],
    )?;
    for button in &message.buttons {
        tx.execute(
            "INSERT INTO buttons (name, link, msg_id) VALUES (?1, ?2, ?3)",
            params![button.name, button.link, msg_id],
        )?;
    }
    Ok(msg_id)
}

fn list_all(tx: &Transaction<'_>) -> Result<Vec<StoredMessage>> {
    let mut files: HashMap<i64, String> = HashMap::new();
    {
        let mut stmt = tx.prepare("SELECT msg_id, file_link FROM message_files ORDER BY rowid")?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))?;
        for row in rows {
            let (id, link) = row?;
            files.entry(id).or_insert(link);
        }
    }

    let mut buttons: HashMap<i64, Vec<Button>> = HashMap::new();
    {
        let mut stmt = tx.prepare("SELECT msg_id, name, link FROM buttons ORDER BY rowid")?;
        let rows = stmt.query_map([], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                Button {
                    name: r.get(1)?,
                    link: r.get(2)?,
                },
            ))
        })?;
        for row in rows {
            let (id, button) = row?;
            buttons.entry(id).or_default().push(button);
        }
    }

    let mut stmt = tx.prepare("SELECT msg_id, text FROM messages ORDER BY msg_id")?;
    let rows = stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))?;
    let mut out = Vec::new();
    for row in rows {
        let (msg_id, text) = row?;
        out.push(StoredMessage {
            msg_id,
            text,
            file_link: files.remove(&msg_id).unwrap_or_default(),
            buttons: buttons.remove(&msg_id).unwrap_or_default(),
        });
    }
    Ok(out)
}
