//! Durable message store
//!
//! Persists the full ordered message list of one conversation at a time in
//! an embedded `sled` key-value database, keyed by conversation id. Message
//! bodies (which may embed image payloads) live here, out-of-line from the
//! lightweight conversation index.

use crate::error::{HealthqueryError, Result};
use crate::types::Message;
use sled::Db;
use std::path::Path;

/// Per-conversation message persistence
///
/// Every mutation replaces the stored record in full: the whole message
/// list is re-serialized on each `put`. This whole-list-replace semantics
/// keeps the store a pure key-value mapping with no patch format.
///
/// Cloning is cheap; clones share the same underlying database.
#[derive(Clone)]
pub struct MessageStore {
    db: Db,
}

impl MessageStore {
    /// Open or create a message store
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the database directory
    ///
    /// # Errors
    ///
    /// Returns `HealthqueryError::Storage` if the database cannot be opened
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| HealthqueryError::Storage(format!("Failed to open database: {}", e)))?;
        Ok(Self { db })
    }

    /// Overwrite (or create) the stored record for a conversation
    ///
    /// # Arguments
    ///
    /// * `conversation_id` - The conversation the messages belong to
    /// * `messages` - The complete ordered message list
    ///
    /// # Errors
    ///
    /// Returns `HealthqueryError::Storage` if serialization or insertion fails
    pub fn put(&self, conversation_id: &str, messages: &[Message]) -> Result<()> {
        let value = serde_json::to_vec(messages)
            .map_err(|e| HealthqueryError::Storage(format!("Serialization failed: {}", e)))?;

        self.db
            .insert(conversation_id.as_bytes(), value)
            .map_err(|e| HealthqueryError::Storage(format!("Insert failed: {}", e)))?;

        self.db
            .flush()
            .map_err(|e| HealthqueryError::Storage(format!("Flush failed: {}", e)))?;

        Ok(())
    }

    /// Retrieve the stored message list for a conversation
    ///
    /// Absence is modeled as "empty conversation", not as an error: a
    /// conversation with no durable record yet returns an empty list.
    ///
    /// # Errors
    ///
    /// Returns `HealthqueryError::Storage` if retrieval or deserialization fails
    pub fn get(&self, conversation_id: &str) -> Result<Vec<Message>> {
        match self
            .db
            .get(conversation_id.as_bytes())
            .map_err(|e| HealthqueryError::Storage(format!("Get failed: {}", e)))?
        {
            Some(bytes) => {
                let messages = serde_json::from_slice(&bytes).map_err(|e| {
                    HealthqueryError::Storage(format!("Deserialization failed: {}", e))
                })?;
                Ok(messages)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Remove the record for a conversation; no-op if absent
    ///
    /// # Errors
    ///
    /// Returns `HealthqueryError::Storage` if removal fails
    pub fn delete(&self, conversation_id: &str) -> Result<()> {
        self.db
            .remove(conversation_id.as_bytes())
            .map_err(|e| HealthqueryError::Storage(format!("Remove failed: {}", e)))?;

        self.db
            .flush()
            .map_err(|e| HealthqueryError::Storage(format!("Flush failed: {}", e)))?;

        Ok(())
    }

    /// Remove all records (administrative reset)
    ///
    /// # Errors
    ///
    /// Returns `HealthqueryError::Storage` if the clear fails
    pub fn clear(&self) -> Result<()> {
        self.db
            .clear()
            .map_err(|e| HealthqueryError::Storage(format!("Clear failed: {}", e)))?;

        self.db
            .flush()
            .map_err(|e| HealthqueryError::Storage(format!("Flush failed: {}", e)))?;

        Ok(())
    }

    /// List all conversation ids that currently hold a record
    ///
    /// Used to reconcile the store against the conversation index and
    /// reclaim records whose index entry is gone.
    pub fn ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for result in self.db.iter() {
            let (key, _) =
                result.map_err(|e| HealthqueryError::Storage(format!("Iteration failed: {}", e)))?;
            ids.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(ids)
    }
}
