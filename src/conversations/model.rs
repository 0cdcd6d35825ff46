//! Conversation data model: threads, turns, and their serialized views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use ulid::Ulid;

/// Longest title a conversation may carry.
pub const MAX_TITLE_CHARS: usize = 255;

/// How many characters of the first message become the default title.
pub const DEFAULT_TITLE_CHARS: usize = 50;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// A named thread of messages, optionally owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    /// Owner; `None` for conversations started anonymously.
    pub user_id: Option<String>,
    pub title: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Start a new conversation for `user_id`.
    ///
    /// Falls back to the head of `first_message` when no title is given.
    pub fn start(
        user_id: Option<&str>,
        title: Option<&str>,
        first_message: &str,
        platform: &str,
        theme: &str,
    ) -> Self {
        let now = Utc::now();
        let title = match title {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => default_title(first_message),
        };
        Self {
            id: Ulid::new().to_string(),
            user_id: user_id.map(str::to_string),
            title,
            metadata: json!({
                "platform": platform,
                "theme": theme,
                "created_at": now.to_rfc3339(),
            }),
            created_at: now,
            updated_at: now,
        }
    }
}

/// First [`DEFAULT_TITLE_CHARS`] characters of the message.
pub fn default_title(message: &str) -> String {
    message.chars().take(DEFAULT_TITLE_CHARS).collect()
}

/// One half of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// The user's side of a turn, carrying the generation parameters.
    pub fn user(conversation_id: &str, content: &str, details: &str, platform: &str, theme: &str) -> Self {
        Self::new(
            conversation_id,
            Role::User,
            content.to_string(),
            json!({
                "details": details,
                "platform": platform,
                "theme": theme,
            }),
        )
    }

    /// The assistant's side of a turn: the generated payload, serialized.
    pub fn assistant(conversation_id: &str, generated: &Value, response_status: u16) -> Self {
        let now = Utc::now();
        Self {
            metadata: json!({
                "generated_at": now.to_rfc3339(),
                "response_status": response_status,
            }),
            ..Self::new(
                conversation_id,
                Role::Assistant,
                generated.to_string(),
                Value::Null,
            )
        }
    }

    fn new(conversation_id: &str, role: Role, content: String, metadata: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Ulid::new().to_string(),
            conversation_id: conversation_id.to_string(),
            role,
            content,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A conversation together with its messages, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

/// A conversation as shown in the listing, with its most recent message.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub latest_message: Option<Message>,
}

/// Everything produced by one successful turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub conversation: ConversationDetail,
    pub user_message: Message,
    pub assistant_message: Message,
    pub generated_content: Value,
    /// Whether the turn started a new conversation.
    #[serde(skip)]
    pub created: bool,
}
