// ABOUTME: Chat turn orchestration from submission through streaming relay to durable persistence
// ABOUTME: Shared by the streaming and buffered send paths, with timeouts and client-disconnect handling
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Chat turn orchestration
//!
//! One turn moves through these phases:
//!
//! 1. **Validating**: input limits, conversation ownership, history window read
//! 2. **User persisted**: the user message is stored before any model call
//! 3. **Streaming**: attachments resolved, context assembled, deltas relayed
//!    to the [`TurnSink`] as they arrive and accumulated
//! 4. **Finalizing**: optional first-turn title generated, then the assistant
//!    message, title and a message count increment of two committed together
//! 5. **Completed**: `message_end` emitted
//!
//! Any failure after phase 2 emits a single `error` event and persists
//! nothing further. The user message stays. If the sink's receiver goes
//! away during streaming the completion is dropped (aborting the backend
//! request) and nothing further is persisted.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::config::TurnConfig;
use crate::constants::{limits, service_names::COMPLETION_BACKEND};
use crate::database::ChatStore;
use crate::errors::{AppError, AppResult};
use crate::llm::{
    response_into_stream, ChatRequest, CompletionEvent, FinishReason, LlmProvider, TokenUsage,
};
use crate::models::{
    AttachmentRef, Conversation, ConversationUpdate, Message, NewMessage,
};
use crate::sse::TurnEvent;
use crate::storage::ObjectStore;

use super::attachments::{resolve_attachments, ResolvedAttachments};
use super::context_builder::build_context;
use super::title::{generate_title, title_seed};

// ============================================================================
// Sinks
// ============================================================================

/// The receiving side of a turn's events has gone away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

/// Future that resolves once a sink's receiver has disconnected
pub type ClosedFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Destination of turn events
#[async_trait]
pub trait TurnSink: Send {
    /// Deliver one event in order
    async fn emit(&mut self, event: TurnEvent) -> Result<(), SinkClosed>;

    /// Resolves when the receiver disconnects; never resolves for sinks that cannot disconnect
    fn closed(&self) -> ClosedFuture;
}

/// Sink relaying events over a bounded channel to an SSE response
pub struct ChannelSink {
    tx: mpsc::Sender<TurnEvent>,
}

impl ChannelSink {
    /// Wrap the sending half of a channel
    #[must_use]
    pub const fn new(tx: mpsc::Sender<TurnEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl TurnSink for ChannelSink {
    async fn emit(&mut self, event: TurnEvent) -> Result<(), SinkClosed> {
        self.tx.send(event).await.map_err(|_| SinkClosed)
    }

    fn closed(&self) -> ClosedFuture {
        let tx = self.tx.clone();
        Box::pin(async move { tx.closed().await })
    }
}

/// Sink that records events in memory
#[derive(Debug, Default)]
pub struct BufferSink {
    /// Events in emission order
    pub events: Vec<TurnEvent>,
}

#[async_trait]
impl TurnSink for BufferSink {
    async fn emit(&mut self, event: TurnEvent) -> Result<(), SinkClosed> {
        self.events.push(event);
        Ok(())
    }

    fn closed(&self) -> ClosedFuture {
        Box::pin(std::future::pending())
    }
}

// ============================================================================
// Turn types
// ============================================================================

/// How the completion backend is called
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Token streaming, relayed as it arrives
    Streaming,
    /// Single request; the reply arrives as one delta
    Buffered,
}

/// What the user submitted
#[derive(Debug, Clone, Default)]
pub struct TurnInput {
    /// Message text
    pub content: String,
    /// Attachment references
    pub attachments: Vec<AttachmentRef>,
}

/// A validated turn whose user message is already persisted
#[derive(Debug, Clone)]
pub struct PreparedTurn {
    /// Conversation as read before the turn
    pub conversation: Conversation,
    /// Prior messages, oldest first, excluding this turn's user message
    pub history: Vec<Message>,
    /// Persisted user message
    pub user_message: Message,
    /// Submitted input
    pub input: TurnInput,
}

/// Result of a completed turn
#[derive(Debug, Clone)]
pub struct TurnCompletion {
    /// Persisted user message
    pub user_message: Message,
    /// Persisted assistant message
    pub assistant_message: Message,
    /// Title set on this turn, if any
    pub conversation_title: Option<String>,
    /// Conversation after the turn
    pub conversation: Conversation,
    /// Why generation stopped
    pub finish_reason: FinishReason,
}

/// Terminal state of a turn
#[derive(Debug)]
pub enum TurnOutcome {
    /// Assistant message persisted and `message_end` emitted
    Completed(Box<TurnCompletion>),
    /// `error` emitted; only the user message was persisted
    Failed(AppError),
    /// Receiver disconnected mid-turn; only the user message was persisted
    Cancelled,
}

/// Output of the streaming phase
struct Generated {
    content: String,
    usage: TokenUsage,
    finish_reason: FinishReason,
    attachments: ResolvedAttachments,
}

enum GenerationError {
    Failed(AppError),
    Cancelled,
}

impl From<AppError> for GenerationError {
    fn from(error: AppError) -> Self {
        Self::Failed(error)
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives chat turns against the store, the completion backend and object storage
#[derive(Clone)]
pub struct ChatOrchestrator {
    store: Arc<dyn ChatStore>,
    llm: Arc<dyn LlmProvider>,
    objects: Arc<dyn ObjectStore>,
    config: TurnConfig,
}

impl ChatOrchestrator {
    /// Create an orchestrator
    #[must_use]
    pub fn new(
        store: Arc<dyn ChatStore>,
        llm: Arc<dyn LlmProvider>,
        objects: Arc<dyn ObjectStore>,
        config: TurnConfig,
    ) -> Self {
        Self {
            store,
            llm,
            objects,
            config,
        }
    }

    /// Turn settings in effect
    #[must_use]
    pub const fn config(&self) -> &TurnConfig {
        &self.config
    }

    /// Validate a submission and persist the user message.
    ///
    /// Business rules:
    /// - text or at least one attachment is required
    /// - text is limited to 32 000 characters, attachments to 10
    /// - the conversation must exist and belong to `user_id`
    /// - history is read before the user message is written, so the current
    ///   turn is never part of its own history
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` or `ResourceNotFound` before any write, and
    /// database errors from the store.
    #[instrument(skip(self, input))]
    pub async fn begin_turn(
        &self,
        user_id: &str,
        conversation_id: &str,
        input: TurnInput,
    ) -> AppResult<PreparedTurn> {
        validate_input(&input)?;

        let conversation = self
            .store
            .get_conversation(conversation_id, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation"))?;

        let history = self
            .store
            .get_recent_messages(conversation_id, limits::HISTORY_WINDOW)
            .await?;

        let user_message = self
            .store
            .create_message(
                conversation_id,
                NewMessage::user(input.content.clone(), input.attachments.clone()),
            )
            .await?;

        debug!(
            user_message_id = %user_message.id,
            history = history.len(),
            attachments = input.attachments.len(),
            "User message persisted"
        );

        Ok(PreparedTurn {
            conversation,
            history,
            user_message,
            input,
        })
    }

    /// Drive a prepared turn to its terminal state, emitting events to `sink`.
    ///
    /// Event order is `message_start`, zero or more `content_delta`, then
    /// exactly one `message_end` or `error`. Nothing is emitted after the
    /// terminal event.
    #[instrument(
        skip(self, turn, sink),
        fields(
            conversation_id = %turn.conversation.id,
            user_message_id = %turn.user_message.id
        )
    )]
    pub async fn run_turn<S>(
        &self,
        turn: PreparedTurn,
        mode: CompletionMode,
        sink: &mut S,
    ) -> TurnOutcome
    where
        S: TurnSink + ?Sized,
    {
        let started = Instant::now();

        if sink
            .emit(TurnEvent::MessageStart {
                user_message_id: turn.user_message.id.clone(),
            })
            .await
            .is_err()
        {
            info!("Client disconnected before streaming started");
            return TurnOutcome::Cancelled;
        }

        let closed = sink.closed();
        let generation = timeout(self.config.turn_timeout, self.generate(&turn, mode, sink));

        let generated = tokio::select! {
            biased;
            () = closed => Err(GenerationError::Cancelled),
            result = generation => result.unwrap_or_else(|_| {
                Err(GenerationError::Failed(AppError::external_unavailable(
                    COMPLETION_BACKEND,
                    format!(
                        "Reply did not complete within {:?}",
                        self.config.turn_timeout
                    ),
                )))
            }),
        };

        let generated = match generated {
            Ok(generated) => generated,
            Err(GenerationError::Cancelled) => {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Client disconnected mid-stream; discarding partial reply"
                );
                return TurnOutcome::Cancelled;
            }
            Err(GenerationError::Failed(error)) => {
                return self.fail(sink, error).await;
            }
        };

        match self.finalize(&turn, mode, generated).await {
            Ok(completion) => {
                // The turn is durable at this point; a late disconnect only loses the event
                let _ = sink
                    .emit(TurnEvent::MessageEnd {
                        message_id: completion.assistant_message.id.clone(),
                        tokens: completion.assistant_message.tokens.unwrap_or_default(),
                        conversation_title: completion.conversation_title.clone(),
                    })
                    .await;
                info!(
                    assistant_message_id = %completion.assistant_message.id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    titled = completion.conversation_title.is_some(),
                    "Chat turn completed"
                );
                TurnOutcome::Completed(Box::new(completion))
            }
            Err(error) => self.fail(sink, error).await,
        }
    }

    /// Run a whole turn without incremental relay
    ///
    /// # Errors
    ///
    /// Returns validation and not-found errors before persistence, and the
    /// completion or persistence error that stopped the turn afterwards.
    pub async fn send_message(
        &self,
        user_id: &str,
        conversation_id: &str,
        input: TurnInput,
    ) -> AppResult<TurnCompletion> {
        let turn = self.begin_turn(user_id, conversation_id, input).await?;
        let mut sink = BufferSink::default();
        match self.run_turn(turn, CompletionMode::Buffered, &mut sink).await {
            TurnOutcome::Completed(completion) => Ok(*completion),
            TurnOutcome::Failed(error) => Err(error),
            TurnOutcome::Cancelled => Err(AppError::internal("Buffered turn was cancelled")),
        }
    }

    /// Resolve attachments, call the backend and relay deltas until the finish event
    async fn generate<S>(
        &self,
        turn: &PreparedTurn,
        mode: CompletionMode,
        sink: &mut S,
    ) -> Result<Generated, GenerationError>
    where
        S: TurnSink + ?Sized,
    {
        let attachments =
            resolve_attachments(self.objects.as_ref(), &turn.input.attachments).await;
        let messages = build_context(
            &turn.conversation.system_prompt,
            &turn.history,
            &turn.input.content,
            &attachments,
        );
        let request = ChatRequest::new(messages)
            .with_model(turn.conversation.model.clone())
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        let idle = self.config.idle_timeout;
        let idle_error = || {
            AppError::external_unavailable(
                COMPLETION_BACKEND,
                format!("No data received for {idle:?}"),
            )
        };

        let mut stream = match mode {
            CompletionMode::Streaming => timeout(idle, self.llm.complete_stream(&request))
                .await
                .map_err(|_| idle_error())??,
            CompletionMode::Buffered => response_into_stream(self.llm.complete(&request).await?),
        };

        let mut content = String::new();
        loop {
            let next = timeout(idle, stream.next()).await.map_err(|_| idle_error())?;
            match next {
                Some(Ok(CompletionEvent::ContentDelta { delta })) => {
                    content.push_str(&delta);
                    sink.emit(TurnEvent::ContentDelta { delta })
                        .await
                        .map_err(|SinkClosed| GenerationError::Cancelled)?;
                }
                Some(Ok(CompletionEvent::Finish { reason, usage })) => {
                    if reason != FinishReason::Stop {
                        warn!(finish_reason = ?reason, "Completion finished abnormally");
                    }
                    return Ok(Generated {
                        content,
                        usage: usage.unwrap_or_default(),
                        finish_reason: reason,
                        attachments,
                    });
                }
                Some(Err(error)) => return Err(error.into()),
                None => {
                    return Err(AppError::external_service(
                        COMPLETION_BACKEND,
                        "Completion stream ended without a finish event",
                    )
                    .into())
                }
            }
        }
    }

    /// Generate the optional title, then commit the assistant message, title
    /// and message count as one store write
    async fn finalize(
        &self,
        turn: &PreparedTurn,
        mode: CompletionMode,
        generated: Generated,
    ) -> AppResult<TurnCompletion> {
        let title_allowed = match mode {
            CompletionMode::Streaming => true,
            CompletionMode::Buffered => self.config.title_on_non_streaming,
        };
        let conversation_title = if title_allowed && turn.conversation.message_count == 0 {
            let seed = title_seed(&turn.input.content, &generated.attachments);
            timeout(
                self.config.idle_timeout,
                generate_title(self.llm.as_ref(), &seed),
            )
            .await
            .unwrap_or_else(|_| {
                warn!("Title generation timed out");
                None
            })
        } else {
            None
        };

        let (assistant_message, conversation) = self
            .store
            .complete_turn(
                &turn.conversation.id,
                &turn.conversation.user_id,
                NewMessage::assistant(generated.content, generated.usage),
                ConversationUpdate {
                    title: conversation_title.clone(),
                    message_count_increment: Some(2),
                    ..ConversationUpdate::default()
                },
            )
            .await?;

        Ok(TurnCompletion {
            user_message: turn.user_message.clone(),
            assistant_message,
            conversation_title,
            conversation,
            finish_reason: generated.finish_reason,
        })
    }

    async fn fail<S>(&self, sink: &mut S, error: AppError) -> TurnOutcome
    where
        S: TurnSink + ?Sized,
    {
        warn!(code = ?error.code, error = %error.message, "Chat turn failed");
        let description = if self.config.expose_error_detail {
            error.message.clone()
        } else {
            error.client_message()
        };
        // Nothing more can be done if the receiver is already gone
        let _ = sink.emit(TurnEvent::Error { error: description }).await;
        TurnOutcome::Failed(error)
    }
}

fn validate_input(input: &TurnInput) -> AppResult<()> {
    if input.content.trim().is_empty() && input.attachments.is_empty() {
        return Err(AppError::invalid_input(
            "Message content or attachments are required",
        ));
    }
    if input.content.chars().count() > limits::MAX_MESSAGE_CHARS {
        return Err(AppError::invalid_input(format!(
            "Message content exceeds {} characters",
            limits::MAX_MESSAGE_CHARS
        )));
    }
    if input.attachments.len() > limits::MAX_ATTACHMENTS {
        return Err(AppError::invalid_input(format!(
            "At most {} attachments are allowed per message",
            limits::MAX_ATTACHMENTS
        )));
    }
    Ok(())
}
