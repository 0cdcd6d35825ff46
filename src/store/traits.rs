//! Repository traits: one per entity, plus the unit of work that groups
//! conversation and message writes into a single transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::model::{AccessToken, User};
use crate::conversations::model::{Conversation, Message};
use crate::error::DatabaseError;

/// Conversation persistence.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Insert a new conversation.
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), DatabaseError>;

    /// Get a conversation by ID.
    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, DatabaseError>;

    /// Conversations owned by `user_id` (ownerless ones when `None`),
    /// most recently updated first.
    async fn list_conversations(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<Conversation>, DatabaseError>;

    /// Set the title and bump `updated_at`. Returns `false` if no row matched.
    async fn update_conversation_title(
        &self,
        id: &str,
        title: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Bump `updated_at`. Returns `false` if no row matched.
    async fn touch_conversation(&self, id: &str, at: DateTime<Utc>) -> Result<bool, DatabaseError>;

    /// Delete a conversation and, through the foreign key, its messages.
    async fn delete_conversation(&self, id: &str) -> Result<bool, DatabaseError>;
}

/// Message persistence.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Insert a message.
    async fn insert_message(&self, message: &Message) -> Result<(), DatabaseError>;

    /// All messages of a conversation, oldest first.
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, DatabaseError>;

    /// The most recent message of a conversation.
    async fn latest_message(&self, conversation_id: &str) -> Result<Option<Message>, DatabaseError>;

    /// Number of messages in a conversation.
    async fn count_messages(&self, conversation_id: &str) -> Result<i64, DatabaseError>;
}

/// User account persistence.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user. A duplicate email yields `DatabaseError::Constraint`.
    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError>;

    async fn get_user(&self, id: &str) -> Result<Option<User>, DatabaseError>;

    /// Look a user up by (already lowercased) email.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;
}

/// Bearer token persistence.
#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn insert_token(&self, token: &AccessToken) -> Result<(), DatabaseError>;

    /// Find the token with this hash. Read-only.
    async fn find_token(&self, token_hash: &str) -> Result<Option<AccessToken>, DatabaseError>;

    /// Revoke one token. Returns `false` if it did not exist.
    async fn delete_token(&self, token_hash: &str) -> Result<bool, DatabaseError>;
}

/// An open storage transaction.
///
/// Writes made through it are invisible to other connections until
/// [`UnitOfWork::commit`]. Consuming it with [`UnitOfWork::rollback`]
/// discards them; so does dropping it.
#[async_trait]
pub trait UnitOfWork: ConversationRepository + MessageRepository {
    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}

/// Backend-agnostic store covering every entity.
#[async_trait]
pub trait Store:
    ConversationRepository + MessageRepository + UserRepository + TokenRepository
{
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Open a unit of work on a dedicated connection.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, DatabaseError>;
}
