//! Conversation endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use super::extract::{ClientAddr, ConversationCaller, ValidJson};
use super::response::ApiError;
use crate::conversations::SendMessageRequest;

#[derive(Debug, Deserialize)]
struct UpdateBody {
    title: Option<String>,
}

/// GET /conversations
async fn list_conversations(
    State(state): State<AppState>,
    client: ClientAddr,
    ConversationCaller(caller): ConversationCaller,
) -> Result<impl IntoResponse, ApiError> {
    let conversations = state
        .conversations
        .list(&caller)
        .await
        .map_err(|e| state.reject(e, &client))?;
    Ok(Json(json!({"success": true, "data": conversations})))
}

/// GET /conversations/{id}
async fn show_conversation(
    State(state): State<AppState>,
    client: ClientAddr,
    ConversationCaller(caller): ConversationCaller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .conversations
        .show(&caller, &id)
        .await
        .map_err(|e| state.reject(e, &client))?;
    Ok(Json(json!({"success": true, "data": detail})))
}

/// POST /conversations/send
///
/// 201 when the turn started a new conversation, 200 otherwise.
async fn send_message(
    State(state): State<AppState>,
    client: ClientAddr,
    ConversationCaller(caller): ConversationCaller,
    ValidJson(body): ValidJson<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .conversations
        .send_message(&caller, body)
        .await
        .map_err(|e| state.reject(e, &client))?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(json!({"success": true, "data": outcome}))))
}

/// PUT /conversations/{id}
async fn update_conversation(
    State(state): State<AppState>,
    client: ClientAddr,
    ConversationCaller(caller): ConversationCaller,
    Path(id): Path<String>,
    ValidJson(body): ValidJson<UpdateBody>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation = state
        .conversations
        .update_title(&caller, &id, body.title.as_deref())
        .await
        .map_err(|e| state.reject(e, &client))?;
    Ok(Json(json!({"success": true, "data": conversation})))
}

/// DELETE /conversations/{id}
async fn delete_conversation(
    State(state): State<AppState>,
    client: ClientAddr,
    ConversationCaller(caller): ConversationCaller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .conversations
        .destroy(&caller, &id)
        .await
        .map_err(|e| state.reject(e, &client))?;
    Ok(Json(json!({
        "success": true,
        "message": "Conversation deleted successfully",
    })))
}

pub fn conversation_routes() -> Router<AppState> {
    Router::new()
        .route("/conversations", get(list_conversations))
        .route("/conversations/send", post(send_message))
        .route(
            "/conversations/{id}",
            get(show_conversation)
                .put(update_conversation)
                .delete(delete_conversation),
        )
}
