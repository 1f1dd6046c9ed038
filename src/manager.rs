//! Conversation manager
//!
//! The orchestrating component of the persistence engine: owns the active
//! conversation selection, mediates between the in-memory session view and
//! the two durable tiers, derives titles, and is the sole writer to both
//! the conversation index and the message store.
//!
//! # Update model
//!
//! Every durable mutation happens in two phases: a synchronous session-view
//! update before the first await point (the UI sees the change immediately),
//! followed by an asynchronous durable write. Storage failures are absorbed
//! and logged; the in-memory state remains the last known good and the
//! caller keeps composing, at the cost of session-only durability.
//!
//! # Write serialization
//!
//! Rapid snapshot writes for one conversation (streaming assistant updates)
//! race on completion order. Each snapshot carries a sequence number
//! allocated at mutation time, and writes for a conversation funnel through
//! a per-conversation async mutex that drops any snapshot older than the
//! one already claimed. After all pending persistence settles, the durable
//! record equals the latest in-memory list.

use crate::config::StorageConfig;
use crate::error::Result;
use crate::index::ConversationIndex;
use crate::store::MessageStore;
use crate::types::{
    derive_title, ConversationMeta, Message, MessageRole, SessionView, DEFAULT_TITLE,
    FALLBACK_TITLE,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task;

/// In-memory state guarded by the manager's lock
///
/// Held only across synchronous sections, never across an await point.
struct ManagerState {
    session: SessionView,
    /// Bumped whenever the active conversation changes; in-flight loads
    /// compare against it and discard stale results.
    load_generation: u64,
    /// Allocator for snapshot sequence numbers.
    write_seq: u64,
}

/// Single source of truth for the active conversation and its messages
///
/// Shareable across tasks via `Arc`; all methods take `&self`. No other
/// component writes to either storage tier.
///
/// # Examples
///
/// ```no_run
/// use healthquery::config::StorageConfig;
/// use healthquery::manager::ConversationManager;
/// use healthquery::types::Message;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let manager = ConversationManager::open(&StorageConfig::resolve()?).await?;
///     manager.create_conversation();
///     manager.append_message(Message::user("Hello")).await;
///     Ok(())
/// }
/// ```
pub struct ConversationManager {
    index: ConversationIndex,
    store: MessageStore,
    state: Mutex<ManagerState>,
    /// Per-conversation write gates; the guarded value is the highest
    /// snapshot sequence already claimed for that conversation.
    writers: Mutex<HashMap<String, Arc<AsyncMutex<u64>>>>,
}

impl ConversationManager {
    /// Open both storage tiers and restore the most recent conversation
    ///
    /// Creates the data directory and schemas as needed, reclaims message
    /// records orphaned by interrupted deletions, then selects the
    /// most-recently-updated conversation (if any) and loads its messages.
    /// With an empty index the session starts with no active conversation;
    /// the caller creates one when it observes that.
    ///
    /// # Errors
    ///
    /// Returns `HealthqueryError::Storage` if either tier cannot be opened
    pub async fn open(config: &StorageConfig) -> Result<Self> {
        config.ensure_dirs()?;
        let index = ConversationIndex::open(config.index_path())?;
        let store = MessageStore::open(config.messages_path())?;

        let manager = Self {
            index,
            store,
            state: Mutex::new(ManagerState {
                session: SessionView::default(),
                load_generation: 0,
                write_seq: 0,
            }),
            writers: Mutex::new(HashMap::new()),
        };

        manager.reclaim_orphans();

        let most_recent = manager.index.list()?.into_iter().next();
        if let Some(meta) = most_recent {
            tracing::info!("Restoring conversation {} ({})", meta.id, meta.title);
            manager.select_conversation(&meta.id).await;
        }

        Ok(manager)
    }

    /// Create a new conversation and make it active
    ///
    /// The conversation starts with the title "New Chat" and no messages;
    /// no durable message record exists until the first message arrives.
    /// Any in-flight load for a previously selected conversation is
    /// cancelled. Returns the new conversation's metadata.
    pub fn create_conversation(&self) -> ConversationMeta {
        let meta = ConversationMeta::new();

        if let Err(e) = self.index.upsert(&meta) {
            tracing::warn!(
                "Failed to persist metadata for new conversation {}; it is session-only: {}",
                meta.id,
                e
            );
        }

        let mut state = self.state();
        state.load_generation += 1;
        state.session = SessionView {
            conversation_id: Some(meta.id.clone()),
            ..SessionView::default()
        };

        meta
    }

    /// Make a known conversation active and load its messages
    ///
    /// Unknown ids are logged and ignored. The session view is cleared
    /// immediately so stale content is never shown while the fetch runs;
    /// once the returned future settles, the view's messages equal the
    /// durable record (or are empty if none exists or the fetch failed).
    /// A load whose target stopped being active while it was in flight is
    /// discarded silently.
    pub async fn select_conversation(&self, id: &str) {
        match self.index.get(id) {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!("select_conversation: unknown conversation id {}", id);
                return;
            }
            Err(e) => {
                tracing::warn!("Failed to read conversation index: {}", e);
                return;
            }
        }

        let generation = {
            let mut state = self.state();
            state.load_generation += 1;
            state.session = SessionView {
                conversation_id: Some(id.to_string()),
                ..SessionView::default()
            };
            state.load_generation
        };

        let store = self.store.clone();
        let target = id.to_string();
        let loaded = task::spawn_blocking(move || store.get(&target)).await;

        let mut state = self.state();
        if state.load_generation != generation {
            tracing::debug!("Discarding stale load for conversation {}", id);
            return;
        }

        match loaded {
            Ok(Ok(messages)) => {
                tracing::debug!("Loaded {} messages for conversation {}", messages.len(), id);
                state.session.messages = messages;
            }
            Ok(Err(e)) => {
                // Fail safe to an empty view rather than showing wrong data.
                tracing::warn!("Failed to load messages for conversation {}: {}", id, e);
                state.session.messages.clear();
            }
            Err(e) => {
                tracing::warn!("Load task for conversation {} failed: {}", id, e);
                state.session.messages.clear();
            }
        }
    }

    /// Append a message to the active conversation
    ///
    /// The session view is updated synchronously; the full message list is
    /// then persisted through the serialized write path and the index entry
    /// gets a fresh `last_updated`. The first user message in a conversation
    /// still titled "New Chat" also derives the title. With no active
    /// conversation this is a logged no-op (a caller bug, not a recoverable
    /// runtime condition).
    pub async fn append_message(&self, message: Message) {
        let (conversation_id, seq, snapshot, user_count) = {
            let mut state = self.state();
            let Some(conversation_id) = state.session.conversation_id.clone() else {
                tracing::warn!("append_message called with no active conversation");
                return;
            };
            if state.session.messages.iter().any(|m| m.id == message.id) {
                tracing::debug!("Ignoring duplicate append of message {}", message.id);
                return;
            }
            state.session.messages.push(message.clone());
            state.write_seq += 1;
            let user_count = state
                .session
                .messages
                .iter()
                .filter(|m| m.role == MessageRole::User)
                .count();
            (
                conversation_id,
                state.write_seq,
                state.session.messages.clone(),
                user_count,
            )
        };

        self.update_index_after_append(&conversation_id, &message, user_count);
        self.persist(conversation_id, seq, snapshot).await;
    }

    /// Replace the content of a message in the active conversation
    ///
    /// This is the incremental path for streaming assistant responses: the
    /// caller appends a placeholder message, then rewrites it as fragments
    /// arrive and once more with the final text. Unknown message ids are a
    /// no-op. The full list is re-persisted and `last_updated` bumped.
    pub async fn update_message(&self, id: &str, new_content: impl Into<String>) {
        let new_content = new_content.into();

        let (conversation_id, seq, snapshot) = {
            let mut state = self.state();
            let Some(conversation_id) = state.session.conversation_id.clone() else {
                tracing::warn!("update_message called with no active conversation");
                return;
            };
            let Some(message) = state.session.messages.iter_mut().find(|m| m.id == id) else {
                tracing::debug!("update_message: message {} not found", id);
                return;
            };
            message.content = new_content;
            state.write_seq += 1;
            (
                conversation_id,
                state.write_seq,
                state.session.messages.clone(),
            )
        };

        self.touch_conversation(&conversation_id);
        self.persist(conversation_id, seq, snapshot).await;
    }

    /// Delete a conversation from both tiers
    ///
    /// The index entry is removed first; the message record deletion is
    /// best-effort (a failure leaves an orphan that `open` reclaims later).
    /// When the active conversation is deleted, the most-recently-updated
    /// remaining conversation becomes active, or the session empties out
    /// with no active conversation if none remain.
    pub async fn delete_conversation(&self, id: &str) {
        match self.index.remove(id) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("delete_conversation: unknown conversation id {}", id);
                return;
            }
            Err(e) => {
                tracing::warn!("Failed to remove conversation {} from index: {}", id, e);
                return;
            }
        }

        let was_active = {
            let mut state = self.state();
            if state.session.conversation_id.as_deref() == Some(id) {
                state.load_generation += 1;
                state.session = SessionView::default();
                true
            } else {
                false
            }
        };

        self.writers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(id);

        let store = self.store.clone();
        let target = id.to_string();
        match task::spawn_blocking(move || store.delete(&target)).await {
            Ok(Ok(())) => tracing::debug!("Deleted stored messages for conversation {}", id),
            Ok(Err(e)) => tracing::warn!(
                "Failed to delete stored messages for conversation {}; reclaimed on next open: {}",
                id,
                e
            ),
            Err(e) => tracing::warn!("Delete task for conversation {} failed: {}", id, e),
        }

        if was_active {
            match self.index.list() {
                Ok(remaining) => {
                    if let Some(next) = remaining.first() {
                        self.select_conversation(&next.id).await;
                    }
                }
                Err(e) => tracing::warn!("Failed to pick a replacement conversation: {}", e),
            }
        }
    }

    /// Rename a conversation
    ///
    /// Pure index mutation; message bodies and `last_updated` are untouched.
    /// A title that is empty after trimming falls back to "Untitled Chat".
    /// Unknown ids are logged and ignored.
    pub fn rename_conversation(&self, id: &str, new_title: &str) {
        let trimmed = new_title.trim();
        let title = if trimmed.is_empty() {
            FALLBACK_TITLE
        } else {
            trimmed
        };

        match self.index.get(id) {
            Ok(Some(mut meta)) => {
                meta.title = title.to_string();
                if let Err(e) = self.index.upsert(&meta) {
                    tracing::warn!("Failed to rename conversation {}: {}", id, e);
                }
            }
            Ok(None) => tracing::warn!("rename_conversation: unknown conversation id {}", id),
            Err(e) => tracing::warn!("Failed to read conversation index: {}", e),
        }
    }

    /// All known conversations, most-recently-updated first
    ///
    /// # Errors
    ///
    /// Returns `HealthqueryError::Storage` if the index cannot be read; the
    /// caller may surface this as a transient banner.
    pub fn list_conversations(&self) -> Result<Vec<ConversationMeta>> {
        self.index.list()
    }

    /// A snapshot of the current session view
    pub fn session(&self) -> SessionView {
        self.state().session.clone()
    }

    /// The active conversation id, or None when nothing is selected
    pub fn active_conversation_id(&self) -> Option<String> {
        self.state().session.conversation_id.clone()
    }

    /// Set the ephemeral input buffer; never persisted
    pub fn set_input_text(&self, text: impl Into<String>) {
        self.state().session.input_text = text.into();
    }

    /// Set the ephemeral awaiting-response flag; never persisted
    pub fn set_awaiting_response(&self, awaiting: bool) {
        self.state().session.awaiting_response = awaiting;
    }

    /// Remove every conversation from both tiers and reset the session
    ///
    /// Administrative reset. Storage failures are logged; the in-memory
    /// session is cleared regardless.
    pub fn clear_all(&self) {
        if let Err(e) = self.index.clear() {
            tracing::warn!("Failed to clear conversation index: {}", e);
        }
        if let Err(e) = self.store.clear() {
            tracing::warn!("Failed to clear message store: {}", e);
        }

        self.writers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();

        let mut state = self.state();
        state.load_generation += 1;
        state.session = SessionView::default();
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bump `last_updated` after an append, deriving the title from the
    /// first user message of a conversation still titled "New Chat".
    fn update_index_after_append(&self, conversation_id: &str, message: &Message, user_count: usize) {
        match self.index.get(conversation_id) {
            Ok(Some(mut meta)) => {
                if meta.title == DEFAULT_TITLE
                    && message.role == MessageRole::User
                    && user_count == 1
                {
                    meta.title = derive_title(&message.content);
                }
                meta.touch();
                if let Err(e) = self.index.upsert(&meta) {
                    tracing::warn!(
                        "Failed to update index entry for conversation {}: {}",
                        conversation_id,
                        e
                    );
                }
            }
            Ok(None) => tracing::debug!(
                "No index entry for conversation {} (deleted concurrently?)",
                conversation_id
            ),
            Err(e) => tracing::warn!("Failed to read conversation index: {}", e),
        }
    }

    /// Bump `last_updated` after a message edit
    fn touch_conversation(&self, conversation_id: &str) {
        match self.index.get(conversation_id) {
            Ok(Some(mut meta)) => {
                meta.touch();
                if let Err(e) = self.index.upsert(&meta) {
                    tracing::warn!(
                        "Failed to update index entry for conversation {}: {}",
                        conversation_id,
                        e
                    );
                }
            }
            Ok(None) => tracing::debug!(
                "No index entry for conversation {} (deleted concurrently?)",
                conversation_id
            ),
            Err(e) => tracing::warn!("Failed to read conversation index: {}", e),
        }
    }

    /// Write a snapshot through the per-conversation gate
    ///
    /// Snapshots are claimed in sequence order; a snapshot older than the
    /// highest claimed one is dropped so a slow early write can never
    /// overwrite a later list.
    async fn persist(&self, conversation_id: String, seq: u64, messages: Vec<Message>) {
        let gate = self.writer_gate(&conversation_id);
        let mut claimed = gate.lock().await;
        if seq <= *claimed {
            tracing::debug!(
                "Dropping superseded snapshot {} for conversation {}",
                seq,
                conversation_id
            );
            return;
        }
        *claimed = seq;

        let store = self.store.clone();
        let id = conversation_id.clone();
        match task::spawn_blocking(move || store.put(&id, &messages)).await {
            Ok(Ok(())) => {
                tracing::debug!("Persisted snapshot {} for conversation {}", seq, conversation_id)
            }
            Ok(Err(e)) => tracing::warn!(
                "Failed to persist conversation {}; keeping in-memory state: {}",
                conversation_id,
                e
            ),
            Err(e) => tracing::warn!(
                "Persist task for conversation {} failed: {}",
                conversation_id,
                e
            ),
        }
    }

    fn writer_gate(&self, conversation_id: &str) -> Arc<AsyncMutex<u64>> {
        let mut writers = self
            .writers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writers
            .entry(conversation_id.to_string())
            .or_default()
            .clone()
    }

    /// Delete message records whose index entry is gone
    ///
    /// Deletion removes the index entry first and the message record
    /// best-effort, so a crash or storage failure in between leaves an
    /// orphaned record. Reconciled lazily here on open.
    fn reclaim_orphans(&self) {
        let known: HashSet<String> = match self.index.list() {
            Ok(list) => list.into_iter().map(|meta| meta.id).collect(),
            Err(e) => {
                tracing::warn!("Skipping orphan reclamation; index unreadable: {}", e);
                return;
            }
        };

        let stored = match self.store.ids() {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("Skipping orphan reclamation; store unreadable: {}", e);
                return;
            }
        };

        let mut reclaimed = 0usize;
        for id in stored {
            if !known.contains(&id) {
                match self.store.delete(&id) {
                    Ok(()) => reclaimed += 1,
                    Err(e) => tracing::warn!("Failed to reclaim orphaned record {}: {}", id, e),
                }
            }
        }

        if reclaimed > 0 {
            tracing::info!("Reclaimed {} orphaned message record(s)", reclaimed);
        }
    }
}
