// ABOUTME: Persistence contract for conversations and messages used by routes and the turn orchestrator
// ABOUTME: Defines the ChatStore trait and the page type returned by message listing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Chat persistence
//!
//! The orchestrator only depends on [`ChatStore`]. Every conversation-scoped
//! call takes the owner's user ID so that a conversation belonging to another
//! user is indistinguishable from one that does not exist.
//!
//! Implementations must apply each call atomically.
//! [`ConversationUpdate::message_count_increment`] must be applied as an
//! in-store increment, never read-modify-write, so that concurrent turns on
//! one conversation cannot lose counts. [`ChatStore::complete_turn`] writes the
//! assistant message and the conversation update together or not at all.

/// `SQLite` implementation
pub mod sqlite;

use async_trait::async_trait;

use crate::errors::AppResult;
use crate::models::{Conversation, ConversationUpdate, Message, NewConversation, NewMessage};

pub use sqlite::SqliteChatStore;

/// One page of messages in chronological order
#[derive(Debug, Clone)]
pub struct MessagePage {
    /// Messages, oldest first
    pub messages: Vec<Message>,
    /// Whether older messages exist before this page
    pub has_more: bool,
}

/// Conversation and message storage
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Cheap round trip used by readiness checks
    async fn ping(&self) -> AppResult<()>;

    /// Create a conversation for `user_id`; absent fields take their defaults
    async fn create_conversation(
        &self,
        user_id: &str,
        data: NewConversation,
    ) -> AppResult<Conversation>;

    /// Fetch a conversation if it exists and belongs to `user_id`
    async fn get_conversation(&self, id: &str, user_id: &str) -> AppResult<Option<Conversation>>;

    /// List a user's conversations, most recently updated first, plus the total count
    async fn list_conversations(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> AppResult<(Vec<Conversation>, i64)>;

    /// Apply a partial update and return the updated conversation
    ///
    /// Fails with not-found when the conversation does not exist for `user_id`.
    async fn update_conversation(
        &self,
        id: &str,
        user_id: &str,
        update: ConversationUpdate,
    ) -> AppResult<Conversation>;

    /// Delete a conversation and all its messages; returns whether anything was deleted
    async fn delete_conversation(&self, id: &str, user_id: &str) -> AppResult<bool>;

    /// Append a message to a conversation
    async fn create_message(&self, conversation_id: &str, data: NewMessage) -> AppResult<Message>;

    /// Persist the assistant reply and apply `update` in one transaction
    ///
    /// Either both writes land or neither does. Fails with not-found when the
    /// conversation does not exist for `user_id`.
    async fn complete_turn(
        &self,
        conversation_id: &str,
        user_id: &str,
        assistant: NewMessage,
        update: ConversationUpdate,
    ) -> AppResult<(Message, Conversation)>;

    /// The `limit` most recent messages, oldest first
    async fn get_recent_messages(&self, conversation_id: &str, limit: u32)
        -> AppResult<Vec<Message>>;

    /// A page of up to `limit` messages created before message `before`
    /// (or the most recent page when `before` is `None`), oldest first
    async fn list_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> AppResult<MessagePage>;
}
