//! Ownership check for conversations.

use super::model::Conversation;

/// The resolved identity behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    User(String),
}

impl Caller {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::User(id) => Some(id),
        }
    }
}

/// Whether `caller` may read or mutate `conversation`.
///
/// Owned conversations belong to their owner alone; ownerless ones belong to
/// anonymous callers alone.
pub fn can_access(caller: &Caller, conversation: &Conversation) -> bool {
    conversation.user_id.as_deref() == caller.user_id()
}
