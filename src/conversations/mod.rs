//! Conversations: model, ownership rules, and the service that records turns.

pub mod access;
pub mod model;
pub mod service;

pub use access::{Caller, can_access};
pub use model::{Conversation, ConversationDetail, ConversationSummary, Message, Role, TurnOutcome};
pub use service::{ConversationService, SendMessageRequest};
