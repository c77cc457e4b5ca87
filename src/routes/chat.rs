// ABOUTME: Chat route handlers for conversation management and chat turns
// ABOUTME: REST endpoints for conversations and messages plus the SSE streaming turn endpoint
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Chat routes
//!
//! Conversation CRUD, message paging and the two ways of sending a message:
//! a buffered JSON request/response and a Server-Sent Events stream. Every
//! handler authenticates through [`AuthUser`] and only ever sees the
//! caller's own conversations.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    constants::limits,
    errors::{AppError, AppResult},
    middleware::AuthUser,
    models::{AttachmentRef, Conversation, ConversationUpdate, Message, NewConversation},
    resources::ServerResources,
    services::chat_orchestration::{ChannelSink, CompletionMode, TurnInput, TurnOutcome},
    sse::TurnEvent,
};

// ============================================================================
// Constants
// ============================================================================

/// Events buffered between the turn task and the SSE response
const EVENT_CHANNEL_CAPACITY: usize = 64;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing conversations
#[derive(Debug, Deserialize, Default)]
pub struct ListConversationsQuery {
    /// Maximum number of conversations to return
    #[serde(default)]
    pub limit: Option<u32>,
    /// Offset for pagination
    #[serde(default)]
    pub offset: Option<u32>,
}

/// Response for listing conversations
#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    /// Conversations on this page
    pub conversations: Vec<Conversation>,
    /// Total number of the caller's conversations
    pub total: i64,
    /// Page size used
    pub limit: u32,
    /// Offset used
    pub offset: u32,
}

/// Partial conversation update
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConversationRequest {
    /// New title
    #[serde(default)]
    pub title: Option<String>,
    /// New system prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// New model identifier
    #[serde(default)]
    pub model: Option<String>,
}

/// Response for conversation deletion
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    /// Always true when returned
    pub success: bool,
    /// Human-readable confirmation
    pub message: String,
}

/// Query parameters for listing messages
#[derive(Debug, Deserialize, Default)]
pub struct ListMessagesQuery {
    /// Page size, 1 to 200
    #[serde(default)]
    pub limit: Option<u32>,
    /// Return messages created before this message ID
    #[serde(default)]
    pub before: Option<String>,
}

/// Response for listing messages
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesListResponse {
    /// Messages, oldest first
    pub messages: Vec<Message>,
    /// Whether older messages exist before this page
    pub has_more: bool,
}

/// Request to send a message
#[derive(Debug, Deserialize, Default)]
pub struct SendMessageRequest {
    /// Message text
    #[serde(default)]
    pub content: String,
    /// Attachment references
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

impl From<SendMessageRequest> for TurnInput {
    fn from(request: SendMessageRequest) -> Self {
        Self {
            content: request.content,
            attachments: request.attachments,
        }
    }
}

/// Response for a buffered turn
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletionResponse {
    /// Persisted user message
    pub user_message: Message,
    /// Persisted assistant message
    pub assistant_message: Message,
}

// ============================================================================
// Chat Routes
// ============================================================================

/// Chat routes handler
pub struct ChatRoutes;

impl ChatRoutes {
    /// Create all chat routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(
                "/api/conversations",
                post(Self::create_conversation).get(Self::list_conversations),
            )
            .route(
                "/api/conversations/:conversation_id",
                get(Self::get_conversation)
                    .patch(Self::update_conversation)
                    .delete(Self::delete_conversation),
            )
            .route(
                "/api/conversations/:conversation_id/messages",
                get(Self::list_messages).post(Self::send_message),
            )
            .route(
                "/api/conversations/:conversation_id/messages/stream",
                post(Self::send_message_stream),
            )
            .with_state(resources)
    }

    // ------------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------------

    async fn create_conversation(
        State(resources): State<Arc<ServerResources>>,
        auth: AuthUser,
        Json(request): Json<NewConversation>,
    ) -> Result<Response, AppError> {
        if let Some(title) = &request.title {
            validate_title(title)?;
        }
        if let Some(prompt) = &request.system_prompt {
            validate_system_prompt(prompt)?;
        }

        let conversation = resources
            .store
            .create_conversation(&auth.user_id, request)
            .await?;

        info!(
            user_id = %auth.user_id,
            conversation_id = %conversation.id,
            "Conversation created"
        );

        Ok((StatusCode::CREATED, Json(conversation)).into_response())
    }

    async fn list_conversations(
        State(resources): State<Arc<ServerResources>>,
        auth: AuthUser,
        Query(query): Query<ListConversationsQuery>,
    ) -> Result<Response, AppError> {
        let limit = query
            .limit
            .unwrap_or(limits::DEFAULT_CONVERSATION_PAGE)
            .clamp(1, limits::MAX_CONVERSATION_PAGE);
        let offset = query.offset.unwrap_or(0);

        let (conversations, total) = resources
            .store
            .list_conversations(&auth.user_id, limit, offset)
            .await?;

        Ok(Json(ConversationListResponse {
            conversations,
            total,
            limit,
            offset,
        })
        .into_response())
    }

    async fn get_conversation(
        State(resources): State<Arc<ServerResources>>,
        auth: AuthUser,
        Path(conversation_id): Path<String>,
    ) -> Result<Response, AppError> {
        let conversation = owned_conversation(&resources, &conversation_id, &auth).await?;
        Ok(Json(conversation).into_response())
    }

    async fn update_conversation(
        State(resources): State<Arc<ServerResources>>,
        auth: AuthUser,
        Path(conversation_id): Path<String>,
        Json(request): Json<UpdateConversationRequest>,
    ) -> Result<Response, AppError> {
        if let Some(title) = &request.title {
            validate_title(title)?;
        }
        if let Some(prompt) = &request.system_prompt {
            validate_system_prompt(prompt)?;
        }
        if request.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(AppError::invalid_input("Model must not be empty"));
        }

        let update = ConversationUpdate {
            title: request.title.map(|t| t.trim().to_owned()),
            system_prompt: request.system_prompt,
            model: request.model,
            message_count_increment: None,
        };
        if update.is_empty() {
            return Err(AppError::invalid_input(
                "At least one of title, systemPrompt or model is required",
            ));
        }

        let conversation = resources
            .store
            .update_conversation(&conversation_id, &auth.user_id, update)
            .await?;

        debug!(conversation_id = %conversation.id, "Conversation updated");
        Ok(Json(conversation).into_response())
    }

    async fn delete_conversation(
        State(resources): State<Arc<ServerResources>>,
        auth: AuthUser,
        Path(conversation_id): Path<String>,
    ) -> Result<Response, AppError> {
        let deleted = resources
            .store
            .delete_conversation(&conversation_id, &auth.user_id)
            .await?;
        if !deleted {
            return Err(AppError::not_found("Conversation"));
        }

        info!(
            user_id = %auth.user_id,
            conversation_id = %conversation_id,
            "Conversation deleted"
        );

        Ok(Json(DeleteResponse {
            success: true,
            message: "Conversation deleted".to_owned(),
        })
        .into_response())
    }

    // ------------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------------

    async fn list_messages(
        State(resources): State<Arc<ServerResources>>,
        auth: AuthUser,
        Path(conversation_id): Path<String>,
        Query(query): Query<ListMessagesQuery>,
    ) -> Result<Response, AppError> {
        let limit = query
            .limit
            .unwrap_or(limits::DEFAULT_MESSAGE_PAGE)
            .clamp(1, limits::MAX_MESSAGE_PAGE);

        owned_conversation(&resources, &conversation_id, &auth).await?;

        let page = resources
            .store
            .list_messages(&conversation_id, limit, query.before.as_deref())
            .await?;

        Ok(Json(MessagesListResponse {
            messages: page.messages,
            has_more: page.has_more,
        })
        .into_response())
    }

    /// Run a turn and answer with both persisted messages
    async fn send_message(
        State(resources): State<Arc<ServerResources>>,
        auth: AuthUser,
        Path(conversation_id): Path<String>,
        Json(request): Json<SendMessageRequest>,
    ) -> Result<Response, AppError> {
        let completion = resources
            .orchestrator
            .send_message(&auth.user_id, &conversation_id, request.into())
            .await?;

        Ok(Json(ChatCompletionResponse {
            user_message: completion.user_message,
            assistant_message: completion.assistant_message,
        })
        .into_response())
    }

    /// Run a turn and relay its events as Server-Sent Events
    ///
    /// Validation and ownership failures are answered as plain HTTP errors.
    /// Once the user message is persisted the turn runs on its own task and
    /// every later failure arrives as an `error` event. Dropping the response
    /// closes the channel, which cancels the turn.
    async fn send_message_stream(
        State(resources): State<Arc<ServerResources>>,
        auth: AuthUser,
        Path(conversation_id): Path<String>,
        Json(request): Json<SendMessageRequest>,
    ) -> Result<Response, AppError> {
        let turn = resources
            .orchestrator
            .begin_turn(&auth.user_id, &conversation_id, request.into())
            .await?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let orchestrator = resources.orchestrator.clone();
        tokio::spawn(async move {
            let mut sink = ChannelSink::new(tx);
            if let TurnOutcome::Cancelled = orchestrator
                .run_turn(turn, CompletionMode::Streaming, &mut sink)
                .await
            {
                debug!("Streaming turn cancelled by client");
            }
        });

        let headers = [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (X_ACCEL_BUFFERING, "no"),
        ];
        Ok((headers, event_stream_response(rx)).into_response())
    }
}

/// Relay turn events until the terminal one
fn event_stream_response(
    mut rx: mpsc::Receiver<TurnEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            yield Ok(event.to_sse_event());
            if terminal {
                break;
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn owned_conversation(
    resources: &ServerResources,
    conversation_id: &str,
    auth: &AuthUser,
) -> AppResult<Conversation> {
    resources
        .store
        .get_conversation(conversation_id, &auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Conversation"))
}

fn validate_title(title: &str) -> AppResult<()> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("Title must not be empty"));
    }
    if trimmed.chars().count() > limits::MAX_TITLE_CHARS {
        return Err(AppError::invalid_input(format!(
            "Title exceeds {} characters",
            limits::MAX_TITLE_CHARS
        )));
    }
    Ok(())
}

fn validate_system_prompt(prompt: &str) -> AppResult<()> {
    if prompt.chars().count() > limits::MAX_SYSTEM_PROMPT_CHARS {
        return Err(AppError::invalid_input(format!(
            "System prompt exceeds {} characters",
            limits::MAX_SYSTEM_PROMPT_CHARS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_validation() {
        assert!(validate_title("Trip planning").is_ok());
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"t".repeat(limits::MAX_TITLE_CHARS + 1)).is_err());
    }

    #[test]
    fn test_send_request_defaults() {
        let request: SendMessageRequest = serde_json::from_str("{}").unwrap();
        assert!(request.content.is_empty());
        assert!(request.attachments.is_empty());
    }
}
