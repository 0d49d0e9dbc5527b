use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex, MutexGuard};

pub mod models;
use models::*;

use crate::live_feed::FavoritesCleanup;

/// Thread-safe SQLite connection pool (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::with_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Favorites ────────────────────────────────────────────────────────────

    /// Follow a match. Following the same match twice is a no-op.
    pub fn add_favorite(&self, user_id: &str, match_id: &str, sport: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO favorites (user_id, match_id, sport, added_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, match_id, sport, Utc::now()],
        )?;
        Ok(())
    }

    pub fn list_favorites(&self, user_id: &str) -> Result<Vec<Favorite>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, match_id, sport, added_at
             FROM favorites WHERE user_id = ?1 ORDER BY added_at DESC, id DESC",
        )?;
        let favorites = stmt
            .query_map(params![user_id], map_favorite)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(favorites)
    }

    /// Drop every user's favorite pointing at one of `match_ids`.
    pub fn remove_favorites_for_matches(&self, match_ids: &[String]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM favorites WHERE match_id = ?1")?;
            for id in match_ids {
                removed += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }
}

#[async_trait]
impl FavoritesCleanup for Database {
    async fn remove_finished_favorites(&self, match_ids: &[String]) -> Result<usize> {
        let db = self.clone();
        let ids = match_ids.to_vec();
        tokio::task::spawn_blocking(move || db.remove_favorites_for_matches(&ids))
            .await
            .context("favorites cleanup task panicked")?
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

fn map_favorite(row: &rusqlite::Row) -> rusqlite::Result<Favorite> {
    Ok(Favorite {
        id: row.get(0)?,
        user_id: row.get(1)?,
        match_id: row.get(2)?,
        sport: row.get(3)?,
        added_at: row.get(4)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS favorites (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id   TEXT    NOT NULL,
    match_id  TEXT    NOT NULL,
    sport     TEXT    NOT NULL,
    added_at  TEXT    NOT NULL,
    UNIQUE (user_id, match_id)
);

CREATE INDEX IF NOT EXISTS idx_favorites_match ON favorites(match_id);
"#;
