//! HealthQuery - conversation persistence and session management engine
//!
//! This library keeps an in-memory "active conversation" view, a durable
//! metadata index, and durable per-conversation message bodies consistent
//! across reloads, edits, and deletions. It is the persistence core behind
//! the HealthQuery assistant; UI shells embed it and drive it through
//! [`ConversationManager`].
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `manager`: the orchestrator owning active-conversation selection and
//!   all writes to both storage tiers
//! - `store`: the sled message store holding full ordered message lists,
//!   keyed by conversation id
//! - `index`: the SQLite registry of lightweight conversation metadata
//! - `types`: messages, conversation metadata, and the session view
//! - `config`: data directory resolution
//! - `error`: error types and result aliases
//!
//! Metadata and message bodies are deliberately split across two tiers:
//! titles and timestamps change on nearly every interaction and stay small,
//! while message lists (which may embed image payloads) are large and only
//! rewritten through the manager's serialized write path.
//!
//! # Example
//!
//! ```no_run
//! use healthquery::{ConversationManager, Message, StorageConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let manager = ConversationManager::open(&StorageConfig::resolve()?).await?;
//!
//!     if manager.active_conversation_id().is_none() {
//!         manager.create_conversation();
//!     }
//!     manager.append_message(Message::user("What causes a fever?")).await;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod manager;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::StorageConfig;
pub use error::{HealthqueryError, Result};
pub use index::ConversationIndex;
pub use manager::ConversationManager;
pub use store::MessageStore;
pub use types::{ConversationMeta, Message, MessageRole, SessionView};
