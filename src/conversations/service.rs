//! Conversation service: ownership-guarded reads and writes, and the
//! transactional turn (`send_message`).

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::access::{Caller, can_access};
use super::model::{
    Conversation, ConversationDetail, ConversationSummary, MAX_TITLE_CHARS, Message, TurnOutcome,
};
use crate::error::{DatabaseError, ServiceError};
use crate::generation::{ContentGenerator, GenerationRequest};
use crate::store::{Store, UnitOfWork};
use crate::validation::Validator;

const ENTITY: &str = "conversation";

/// Body of a send request. Everything is optional here; [`ConversationService::send_message`]
/// validates it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendMessageRequest {
    pub conversation_id: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub theme: Option<String>,
    pub platform: Option<String>,
    pub title: Option<String>,
}

/// Validated send parameters.
struct TurnInput {
    message: String,
    title: Option<String>,
    generation: GenerationRequest,
}

impl SendMessageRequest {
    fn validate(&self) -> Result<TurnInput, ServiceError> {
        let mut v = Validator::new();
        let message = v.required("message", self.message.as_deref()).to_string();
        let details = v.required("details", self.details.as_deref()).to_string();
        let theme = v.required("theme", self.theme.as_deref()).to_string();
        let platform = v.required("platform", self.platform.as_deref()).to_string();
        v.max_chars("title", self.title.as_deref(), MAX_TITLE_CHARS);
        v.finish()?;

        Ok(TurnInput {
            message,
            title: self.title.clone(),
            generation: GenerationRequest {
                details,
                theme,
                platform,
            },
        })
    }
}

/// What the unit of work saw once both messages were written.
struct RecordedTurn {
    touched_at: chrono::DateTime<Utc>,
    messages: Vec<Message>,
}

/// Orchestrates storage and generation for conversations.
pub struct ConversationService {
    store: Arc<dyn Store>,
    generator: Arc<dyn ContentGenerator>,
}

impl ConversationService {
    pub fn new(store: Arc<dyn Store>, generator: Arc<dyn ContentGenerator>) -> Self {
        Self { store, generator }
    }

    /// Load a conversation the caller may touch.
    async fn load_accessible(&self, caller: &Caller, id: &str) -> Result<Conversation, ServiceError> {
        let conversation = self
            .store
            .get_conversation(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                entity: ENTITY,
                id: id.to_string(),
            })?;

        if !can_access(caller, &conversation) {
            debug!(conversation_id = id, caller = ?caller, "Conversation access denied");
            return Err(ServiceError::Forbidden {
                entity: ENTITY,
                id: id.to_string(),
            });
        }
        Ok(conversation)
    }

    /// The caller's conversations, most recently active first, each with its
    /// latest message.
    pub async fn list(&self, caller: &Caller) -> Result<Vec<ConversationSummary>, ServiceError> {
        let conversations = self.store.list_conversations(caller.user_id()).await?;
        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let latest_message = self.store.latest_message(&conversation.id).await?;
            summaries.push(ConversationSummary {
                conversation,
                latest_message,
            });
        }
        Ok(summaries)
    }

    /// One conversation with all of its messages.
    pub async fn show(&self, caller: &Caller, id: &str) -> Result<ConversationDetail, ServiceError> {
        let conversation = self.load_accessible(caller, id).await?;
        let messages = self.store.list_messages(&conversation.id).await?;
        Ok(ConversationDetail {
            conversation,
            messages,
        })
    }

    /// Rename a conversation.
    pub async fn update_title(
        &self,
        caller: &Caller,
        id: &str,
        title: Option<&str>,
    ) -> Result<Conversation, ServiceError> {
        let mut v = Validator::new();
        let title = v.required("title", title).to_string();
        v.max_chars("title", Some(&title), MAX_TITLE_CHARS);
        v.finish()?;

        let mut conversation = self.load_accessible(caller, id).await?;
        let now = Utc::now();
        if !self.store.update_conversation_title(id, &title, now).await? {
            // Deleted between the load and the update.
            return Err(ServiceError::NotFound {
                entity: ENTITY,
                id: id.to_string(),
            });
        }
        conversation.title = title;
        conversation.updated_at = now;
        debug!(conversation_id = id, "Conversation renamed");
        Ok(conversation)
    }

    /// Delete a conversation and its messages.
    pub async fn destroy(&self, caller: &Caller, id: &str) -> Result<(), ServiceError> {
        self.load_accessible(caller, id).await?;
        if !self.store.delete_conversation(id).await? {
            return Err(ServiceError::NotFound {
                entity: ENTITY,
                id: id.to_string(),
            });
        }
        info!(conversation_id = id, "Conversation deleted");
        Ok(())
    }

    /// Append one turn: the user's message and the generated reply.
    ///
    /// Generation runs first, with no transaction open. Only a successful
    /// reply opens the unit of work, which writes a newly started
    /// conversation, both messages, and the activity touch together. If
    /// generation fails nothing is written; if any write fails the unit of
    /// work is rolled back and nothing of the attempt remains.
    pub async fn send_message(
        &self,
        caller: &Caller,
        request: SendMessageRequest,
    ) -> Result<TurnOutcome, ServiceError> {
        let input = request.validate()?;

        let (mut conversation, created) = match request.conversation_id.as_deref() {
            Some(id) => (self.load_accessible(caller, id).await?, false),
            None => (
                Conversation::start(
                    caller.user_id(),
                    input.title.as_deref(),
                    &input.message,
                    &input.generation.platform,
                    &input.generation.theme,
                ),
                true,
            ),
        };

        // Stamped before generation so it sorts ahead of the reply.
        let user_message = Message::user(
            &conversation.id,
            &input.message,
            &input.generation.details,
            &input.generation.platform,
            &input.generation.theme,
        );

        let (status, generated_content) = self
            .generator
            .generate(&input.generation)
            .await
            .into_result()
            .inspect_err(|e| {
                debug!(conversation_id = %conversation.id, error = %e, "Generation failed; turn discarded")
            })?;
        let assistant_message = Message::assistant(&conversation.id, &generated_content, status);

        let uow = self.store.begin().await?;
        let recorded = match record_turn(
            uow.as_ref(),
            &conversation,
            created,
            [&user_message, &assistant_message],
        )
        .await
        {
            Ok(recorded) => recorded,
            Err(e) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(
                        conversation_id = %conversation.id,
                        error = %rollback_err,
                        "Rollback failed; connection will be discarded"
                    );
                }
                debug!(conversation_id = %conversation.id, error = %e, "Turn rolled back");
                return Err(e);
            }
        };
        uow.commit().await?;

        conversation.updated_at = recorded.touched_at;
        info!(
            conversation_id = %conversation.id,
            created,
            messages = recorded.messages.len(),
            "Turn recorded"
        );

        Ok(TurnOutcome {
            conversation: ConversationDetail {
                conversation,
                messages: recorded.messages,
            },
            user_message,
            assistant_message,
            generated_content,
            created,
        })
    }
}

/// Writes of a turn, all inside `uow`.
async fn record_turn(
    uow: &dyn UnitOfWork,
    conversation: &Conversation,
    created: bool,
    messages: [&Message; 2],
) -> Result<RecordedTurn, ServiceError> {
    let gone = || ServiceError::NotFound {
        entity: ENTITY,
        id: conversation.id.clone(),
    };

    if created {
        uow.insert_conversation(conversation).await?;
    }

    for message in messages {
        uow.insert_message(message).await.map_err(|e| match e {
            // The conversation was deleted after it was loaded.
            DatabaseError::Constraint(_) if !created => gone(),
            e => e.into(),
        })?;
    }

    let touched_at = Utc::now();
    if !uow.touch_conversation(&conversation.id, touched_at).await? {
        return Err(gone());
    }

    Ok(RecordedTurn {
        touched_at,
        messages: uow.list_messages(&conversation.id).await?,
    })
}
