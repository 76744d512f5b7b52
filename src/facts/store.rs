//! SQLite-backed fact store with CRUD and style persistence.

use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::style::StyleConfig;
use super::{Fact, FactStore};

const STYLE_KEY: &str = "writing_style";

/// Fact store over a single SQLite connection.
///
/// The connection sits behind a `Mutex`; callers in async contexts should use
/// `tokio::task::spawn_blocking`.
pub struct SqliteFactStore {
    conn: Mutex<Connection>,
}

impl SqliteFactStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow!("db lock poisoned: {e}"))
    }

    pub fn get_fact(&self, id: &str) -> Result<Option<Fact>> {
        let conn = self.lock()?;
        let fact = conn
            .query_row(
                "SELECT id, category, text FROM facts WHERE id = ?1",
                params![id],
                row_to_fact,
            )
            .optional()?;
        Ok(fact)
    }

    /// Insert a new fact. Text and category are trimmed; empty text is rejected.
    pub fn insert_fact(&self, category: &str, text: &str) -> Result<Fact> {
        let text = text.trim();
        if text.is_empty() {
            bail!("fact text must not be empty");
        }
        let fact = Fact {
            id: uuid::Uuid::now_v7().to_string(),
            category: category.trim().to_string(),
            text: text.to_string(),
        };
        let now = chrono::Utc::now().to_rfc3339();

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO facts (id, category, text, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![fact.id, fact.category, fact.text, now],
        )
        .context("failed to insert fact")?;

        tracing::debug!(id = %fact.id, category = %fact.category, "fact inserted");
        Ok(fact)
    }

    /// Replace a fact's category and text. Returns `None` if no such fact exists.
    pub fn update_fact(&self, id: &str, category: &str, text: &str) -> Result<Option<Fact>> {
        let text = text.trim();
        if text.is_empty() {
            bail!("fact text must not be empty");
        }
        let category = category.trim();

        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE facts SET category = ?1, text = ?2, updated_at = ?3 WHERE id = ?4",
                params![category, text, chrono::Utc::now().to_rfc3339(), id],
            )
            .context("failed to update fact")?;

        if changed == 0 {
            return Ok(None);
        }
        Ok(Some(Fact {
            id: id.to_string(),
            category: category.to_string(),
            text: text.to_string(),
        }))
    }

    /// Delete a fact. Returns whether a row was removed.
    pub fn delete_fact(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let removed = conn
            .execute("DELETE FROM facts WHERE id = ?1", params![id])
            .context("failed to delete fact")?;
        Ok(removed > 0)
    }

    /// Load the saved writing style, or the default if none was saved.
    pub fn load_style(&self) -> Result<StyleConfig> {
        let conn = self.lock()?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![STYLE_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            Some(json) => serde_json::from_str(&json).context("stored writing style is not valid JSON"),
            None => Ok(StyleConfig::default()),
        }
    }

    pub fn save_style(&self, style: &StyleConfig) -> Result<()> {
        let json = serde_json::to_string(style)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![STYLE_KEY, json],
        )
        .context("failed to save writing style")?;
        Ok(())
    }
}

impl FactStore for SqliteFactStore {
    fn list_facts(&self) -> Result<Vec<Fact>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, category, text FROM facts ORDER BY rowid")?;
        let facts = stmt
            .query_map([], row_to_fact)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(facts)
    }
}

fn row_to_fact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Fact> {
    Ok(Fact {
        id: row.get(0)?,
        category: row.get(1)?,
        text: row.get(2)?,
    })
}
