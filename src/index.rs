//! Conversation index
//!
//! A small, fast-to-sync SQLite registry of conversation metadata (id,
//! title, timestamps). By design it never stores message bodies or image
//! payloads; those live in the sled message store so that frequent metadata
//! updates (title edits, timestamp bumps) stay cheap.

use crate::error::{HealthqueryError, Result};
use crate::types::ConversationMeta;
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;

/// Registry of conversation metadata
///
/// Opens a connection per operation against the database path, matching the
/// short-lived access pattern of metadata updates.
#[derive(Debug, Clone)]
pub struct ConversationIndex {
    db_path: PathBuf,
}

impl ConversationIndex {
    /// Open the index at the given database path, creating the schema
    ///
    /// # Errors
    ///
    /// Returns `HealthqueryError::Storage` if the database cannot be opened
    /// or the schema cannot be created
    pub fn open<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let index = Self {
            db_path: db_path.into(),
        };
        index.init()?;
        Ok(index)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| HealthqueryError::Storage(e.to_string()))?;
        Ok(conn)
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let conn = self.connect()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_updated TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create tables")
        .map_err(|e| HealthqueryError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Insert or replace a conversation's metadata by id
    ///
    /// # Errors
    ///
    /// Returns `HealthqueryError::Storage` if the write fails
    pub fn upsert(&self, meta: &ConversationMeta) -> Result<()> {
        let conn = self.connect()?;

        conn.execute(
            "INSERT OR REPLACE INTO conversations (id, title, created_at, last_updated)
            VALUES (?, ?, ?, ?)",
            params![
                meta.id,
                meta.title,
                format_timestamp(&meta.created_at),
                format_timestamp(&meta.last_updated),
            ],
        )
        .context("Failed to upsert conversation")
        .map_err(|e| HealthqueryError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Look up a conversation's metadata by id
    ///
    /// # Errors
    ///
    /// Returns `HealthqueryError::Storage` if the query fails
    pub fn get(&self, id: &str) -> Result<Option<ConversationMeta>> {
        let conn = self.connect()?;

        let row = conn
            .query_row(
                "SELECT id, title, created_at, last_updated FROM conversations WHERE id = ?",
                params![id],
                meta_from_row,
            )
            .optional()
            .context("Failed to query conversation")
            .map_err(|e| HealthqueryError::Storage(e.to_string()))?;

        Ok(row)
    }

    /// List all known conversations, most-recently-updated first
    ///
    /// # Errors
    ///
    /// Returns `HealthqueryError::Storage` if the query fails
    pub fn list(&self) -> Result<Vec<ConversationMeta>> {
        let conn = self.connect()?;

        let mut stmt = conn
            .prepare(
                "SELECT id, title, created_at, last_updated
                FROM conversations
                ORDER BY last_updated DESC",
            )
            .context("Failed to prepare statement")
            .map_err(|e| HealthqueryError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map([], meta_from_row)
            .context("Failed to query conversations")
            .map_err(|e| HealthqueryError::Storage(e.to_string()))?;

        let mut conversations = Vec::new();
        for meta in rows.flatten() {
            conversations.push(meta);
        }

        Ok(conversations)
    }

    /// Delete a conversation's metadata by id
    ///
    /// Returns true if an entry was removed, false if the id was unknown.
    ///
    /// # Errors
    ///
    /// Returns `HealthqueryError::Storage` if the delete fails
    pub fn remove(&self, id: &str) -> Result<bool> {
        let conn = self.connect()?;

        let affected = conn
            .execute("DELETE FROM conversations WHERE id = ?", params![id])
            .context("Failed to delete conversation")
            .map_err(|e| HealthqueryError::Storage(e.to_string()))?;

        Ok(affected > 0)
    }

    /// Remove all metadata entries (administrative reset)
    ///
    /// # Errors
    ///
    /// Returns `HealthqueryError::Storage` if the delete fails
    pub fn clear(&self) -> Result<()> {
        let conn = self.connect()?;

        conn.execute("DELETE FROM conversations", [])
            .context("Failed to clear conversations")
            .map_err(|e| HealthqueryError::Storage(e.to_string()))?;

        Ok(())
    }
}

/// Fixed-width RFC-3339 with microseconds, so text ordering in SQL matches
/// chronological ordering.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now()) // Fallback if parsing fails
}

fn meta_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationMeta> {
    let id: String = row.get(0)?;
    let title: String = row.get(1)?;
    let created_at: String = row.get(2)?;
    let last_updated: String = row.get(3)?;

    Ok(ConversationMeta {
        id,
        title,
        created_at: parse_timestamp(&created_at),
        last_updated: parse_timestamp(&last_updated),
    })
}
