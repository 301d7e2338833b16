use rusqlite::{params, OptionalExtension};

use crate::{
    domain::{ChatId, Group},
    store::Store,
    Result,
};

/// Outcome of recording a chat the bot was added to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// The chat was already registered; its label was refreshed.
    Refreshed,
    /// The registry is full; the chat was not recorded.
    CapacityReached,
}

/// Destination chats, in registration order.
#[derive(Clone, Debug)]
pub struct GroupRegistry {
    store: Store,
    capacity: usize,
}

impl GroupRegistry {
    pub fn new(store: Store, capacity: usize) -> Self {
        Self { store, capacity }
    }

    pub async fn add(&self, group: Group) -> Result<AddOutcome> {
        let capacity = self.capacity as i64;
        self.store
            .run(move |tx| {
                let known: Option<i64> = tx
                    .query_row(
                        "SELECT rowid FROM groups WHERE id = ?1",
                        params![group.chat_id.0],
                        |r| r.get(0),
                    )
                    .optional()?;
                if let Some(rowid) = known {
                    tx.execute(
                        "UPDATE groups SET username = ?1 WHERE rowid = ?2",
                        params![group.username, rowid],
                    )?;
                    return Ok(AddOutcome::Refreshed);
                }

                let count: i64 = tx.query_row("SELECT COUNT(*) FROM groups", [], |r| r.get(0))?;
                if count >= capacity {
                    return Ok(AddOutcome::CapacityReached);
                }

                tx.execute(
                    "INSERT INTO groups (id, username) VALUES (?1, ?2)",
                    params![group.chat_id.0, group.username],
                )?;
                Ok(AddOutcome::Added)
            })
            .await
    }

    /// Forget a chat. Returns `false` if it was not registered.
    pub async fn remove(&self, chat_id: ChatId) -> Result<bool> {
        self.store
            .run(move |tx| {
                let n = tx.execute("DELETE FROM groups WHERE id = ?1", params![chat_id.0])?;
                Ok(n > 0)
            })
            .await
    }

    /// Remove the `position`-th group (1-based, display order).
    pub async fn remove_at(&self, position: usize) -> Result<Option<Group>> {
        if position == 0 {
            return Ok(None);
        }
        let offset = (position - 1) as i64;
        self.store
            .run(move |tx| {
                let found: Option<(i64, i64, String)> = tx
                    .query_row(
                        "SELECT rowid, id, username FROM groups ORDER BY rowid LIMIT 1 OFFSET ?1",
                        params![offset],
                        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                    )
                    .optional()?;
                let Some((rowid, id, username)) = found else {
                    return Ok(None);
                };
                tx.execute("DELETE FROM groups WHERE rowid = ?1", params![rowid])?;
                Ok(Some(Group {
                    chat_id: ChatId(id),
                    username,
                }))
            })
            .await
    }

    pub async fn list(&self) -> Result<Vec<Group>> {
        self.store
            .run(|tx| {
                let mut stmt = tx.prepare("SELECT id, username FROM groups ORDER BY rowid")?;
                let rows = stmt.query_map([], |r| {
                    Ok(Group {
                        chat_id: ChatId(r.get(0)?),
                        username: r.get(1)?,
                    })
                })?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }

    pub async fn count(&self) -> Result<usize> {
        self.store
            .run(|tx| {
                let n: i64 = tx.query_row("SELECT COUNT(*) FROM groups", [], |r| r.get(0))?;
                Ok(n as usize)
            })
            .await
    }
}
