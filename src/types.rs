//! Core data types for conversation persistence
//!
//! Defines the message and conversation metadata records shared by both
//! storage tiers, plus the in-memory session view that UI callers read.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use uuid::Uuid;

/// Title given to a conversation at creation, before any user message.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Title applied when a rename resolves to an empty string.
pub const FALLBACK_TITLE: &str = "Untitled Chat";

/// Maximum number of characters of the first user message used as a title.
pub const TITLE_MAX_CHARS: usize = 30;

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message authored by the user
    User,
    /// Message produced by the assistant
    Assistant,
}

/// A single chat message within a conversation
///
/// Messages are immutable after creation except for `content`, which is
/// rewritten while an assistant response streams in.
///
/// # Examples
///
/// ```
/// use healthquery::types::{Message, MessageRole};
///
/// let msg = Message::user("What causes a fever?");
/// assert_eq!(msg.role, MessageRole::User);
/// assert!(!msg.id.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier (UUID v4)
    pub id: String,

    /// Text body of the message
    pub content: String,

    /// Who authored the message
    pub role: MessageRole,

    /// Creation time
    pub timestamp: DateTime<Utc>,

    /// True if the message was produced via speech input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_voice: Option<bool>,

    /// Optional inline image payload (data URI) attached by the user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Message {
    /// Creates a new user message
    ///
    /// # Arguments
    ///
    /// * `content` - The message content
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            content: content.into(),
            role: MessageRole::User,
            timestamp: Utc::now(),
            is_voice: None,
            image: None,
        }
    }

    /// Creates a new assistant message
    ///
    /// Streaming callers typically create this with placeholder content and
    /// rewrite it through `ConversationManager::update_message` as fragments
    /// arrive.
    ///
    /// # Arguments
    ///
    /// * `content` - The message content
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            content: content.into(),
            role: MessageRole::Assistant,
            timestamp: Utc::now(),
            is_voice: None,
            image: None,
        }
    }

    /// Marks the message as produced via speech input
    pub fn with_voice(mut self) -> Self {
        self.is_voice = Some(true);
        self
    }

    /// Attaches an inline image payload (data URI)
    ///
    /// # Arguments
    ///
    /// * `image` - The image data URI
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }
}

/// Metadata for one conversation, as stored in the conversation index
///
/// Never carries message bodies; those live out-of-line in the message
/// store, keyed by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMeta {
    /// Unique conversation identifier (ULID)
    pub id: String,

    /// Display title
    pub title: String,

    /// When the conversation was created
    pub created_at: DateTime<Utc>,

    /// When a message was last added or edited; strictly increasing
    pub last_updated: DateTime<Utc>,
}

impl ConversationMeta {
    /// Creates metadata for a brand-new conversation titled "New Chat"
    ///
    /// # Examples
    ///
    /// ```
    /// use healthquery::types::{ConversationMeta, DEFAULT_TITLE};
    ///
    /// let meta = ConversationMeta::new();
    /// assert_eq!(meta.title, DEFAULT_TITLE);
    /// assert_eq!(meta.id.len(), 26); // ULID string length
    /// ```
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: new_conversation_id(),
            title: DEFAULT_TITLE.to_string(),
            created_at: now,
            last_updated: now,
        }
    }

    /// Advances `last_updated` to a strictly later instant
    ///
    /// When the wall clock has not moved past the previous value (rapid
    /// streaming edits), the timestamp is nudged forward by one microsecond
    /// so ordering by `last_updated` stays unambiguous.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.last_updated = if now > self.last_updated {
            now
        } else {
            self.last_updated + Duration::microseconds(1)
        };
    }
}

impl Default for ConversationMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// The in-memory projection UI surfaces read
///
/// `conversation_id` and `messages` mirror durable state through the
/// conversation manager; `input_text` and `awaiting_response` are ephemeral
/// and never persisted.
#[derive(Debug, Clone, Default)]
pub struct SessionView {
    /// Active conversation id, or None when no conversation is selected
    pub conversation_id: Option<String>,

    /// Messages of the active conversation, in insertion order
    pub messages: Vec<Message>,

    /// Free-text input buffer
    pub input_text: String,

    /// True while an assistant response is pending
    pub awaiting_response: bool,
}

/// Generate a new ULID for a conversation
///
/// ULIDs are preferred over UUIDs for conversation ids as they are sortable
/// by timestamp and more human-readable.
pub fn new_conversation_id() -> String {
    Ulid::new().to_string()
}

/// Generate a new UUID v4 for a message
pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Derives a conversation title from the first user message
///
/// Takes the first 30 characters and appends "..." when the content is
/// longer than that.
pub(crate) fn derive_title(content: &str) -> String {
    let mut title: String = content.chars().take(TITLE_MAX_CHARS).collect();
    if content.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_conversation_id_is_ulid() {
        let id = new_conversation_id();
        assert_eq!(id.len(), 26);
    }

    #[test]
    fn test_new_conversation_id_is_unique() {
        assert_ne!(new_conversation_id(), new_conversation_id());
    }

    #[test]
    fn test_new_message_id_is_uuid() {
        let id = new_message_id();
        assert_eq!(id.len(), 36);
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_message_user_constructor() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.content, "Hello");
        assert!(msg.is_voice.is_none());
        assert!(msg.image.is_none());
    }

    #[test]
    fn test_message_assistant_constructor() {
        let msg = Message::assistant("Hi there");
        assert_eq!(msg.role, MessageRole::Assistant);
        assert_eq!(msg.content, "Hi there");
    }

    #[test]
    fn test_message_with_voice_and_image() {
        let msg = Message::user("look at this")
            .with_voice()
            .with_image("data:image/png;base64,AAAA");
        assert_eq!(msg.is_voice, Some(true));
        assert_eq!(msg.image.as_deref(), Some("data:image/png;base64,AAAA"));
    }

    #[test]
    fn test_message_role_serializes_lowercase() {
        let json = serde_json::to_string(&MessageRole::User).unwrap();
        assert_eq!(json, "\"user\"");
        let json = serde_json::to_string(&MessageRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_message_serialization_roundtrip() {
        let msg = Message::user("Hello").with_voice();
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, msg.id);
        assert_eq!(back.content, msg.content);
        assert_eq!(back.role, msg.role);
        assert_eq!(back.is_voice, Some(true));
    }

    #[test]
    fn test_message_optional_fields_skipped_when_absent() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert!(!json.contains("is_voice"));
        assert!(!json.contains("image"));
    }

    #[test]
    fn test_conversation_meta_new_defaults() {
        let meta = ConversationMeta::new();
        assert_eq!(meta.title, DEFAULT_TITLE);
        assert_eq!(meta.created_at, meta.last_updated);
    }

    #[test]
    fn test_touch_is_strictly_increasing() {
        let mut meta = ConversationMeta::new();
        let mut previous = meta.last_updated;
        for _ in 0..100 {
            meta.touch();
            assert!(meta.last_updated > previous);
            previous = meta.last_updated;
        }
    }

    #[test]
    fn test_derive_title_short_content() {
        assert_eq!(derive_title("Hello"), "Hello");
    }

    #[test]
    fn test_derive_title_exactly_thirty_chars() {
        let content = "a".repeat(30);
        assert_eq!(derive_title(&content), content);
    }

    #[test]
    fn test_derive_title_truncates_with_ellipsis() {
        let content = "a".repeat(40);
        let title = derive_title(&content);
        assert_eq!(title, format!("{}...", "a".repeat(30)));
    }

    #[test]
    fn test_derive_title_counts_chars_not_bytes() {
        let content = "é".repeat(31);
        let title = derive_title(&content);
        assert_eq!(title, format!("{}...", "é".repeat(30)));
    }

    #[test]
    fn test_session_view_default_is_empty() {
        let view = SessionView::default();
        assert!(view.conversation_id.is_none());
        assert!(view.messages.is_empty());
        assert!(view.input_text.is_empty());
        assert!(!view.awaiting_response);
    }
}
