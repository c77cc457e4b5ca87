// ABOUTME: SQLite-backed ChatStore with inline schema creation
// ABOUTME: Conversations and messages tables, JSON attachment column, atomic message count increments
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteExecutor, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use super::{ChatStore, MessagePage};
use crate::constants::defaults;
use crate::errors::{AppError, AppResult};
use crate::models::{
    AttachmentRef, Conversation, ConversationUpdate, Message, MessageRole, NewConversation,
    NewMessage, TokenUsage,
};

const CONVERSATION_COLUMNS: &str =
    "id, user_id, title, system_prompt, model, message_count, created_at, updated_at";

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, role, content, attachments, tokens_input, tokens_output, created_at";

/// `SQLite` chat store
#[derive(Clone)]
pub struct SqliteChatStore {
    pool: SqlitePool,
    default_model: String,
}

impl SqliteChatStore {
    /// Open (creating if needed) the database at `url` and ensure the schema exists
    ///
    /// In-memory databases get a single pooled connection so every query sees
    /// the same database.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the file cannot be opened, or
    /// schema creation fails
    pub async fn connect(url: &str, default_model: impl Into<String>) -> AppResult<Self> {
        let in_memory = url.contains(":memory:");
        if !in_memory {
            ensure_parent_dir(url)?;
        }

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::config(format!("Invalid DATABASE_URL: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect_with(options)
            .await
            .map_err(|e| AppError::database(format!("Failed to open database: {e}")))?;

        let store = Self {
            pool,
            default_model: default_model.into(),
        };
        store.migrate().await?;
        info!(in_memory, "Chat store ready");
        Ok(store)
    }

    /// Create tables and indexes if they do not exist
    ///
    /// # Errors
    ///
    /// Returns an error if any DDL statement fails
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS chat_conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                system_prompt TEXT NOT NULL,
                model TEXT NOT NULL,
                message_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create chat_conversations: {e}")))?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS chat_messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES chat_conversations(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                attachments TEXT,
                tokens_input INTEGER,
                tokens_output INTEGER,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create chat_messages: {e}")))?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_chat_conversations_user ON chat_conversations(user_id, updated_at)",
            "CREATE INDEX IF NOT EXISTS idx_chat_messages_conversation ON chat_messages(conversation_id, created_at)",
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::database(format!("Failed to create index: {e}")))?;
        }

        Ok(())
    }

    /// Underlying pool
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn ensure_parent_dir(url: &str) -> AppResult<()> {
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::config(format!(
                    "Failed to create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }
    Ok(())
}

fn conversation_from_row(row: &SqliteRow) -> Conversation {
    Conversation {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        system_prompt: row.get("system_prompt"),
        model: row.get("model"),
        message_count: row.get("message_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn message_from_row(row: &SqliteRow) -> AppResult<Message> {
    let role: String = row.get("role");
    let role = MessageRole::parse(&role)
        .ok_or_else(|| AppError::database(format!("Unknown message role in store: {role}")))?;

    let attachments = row
        .get::<Option<String>, _>("attachments")
        .map(|raw| serde_json::from_str::<Vec<AttachmentRef>>(&raw))
        .transpose()
        .map_err(|e| AppError::database(format!("Corrupt attachments column: {e}")))?;

    let tokens = match (
        row.get::<Option<i64>, _>("tokens_input"),
        row.get::<Option<i64>, _>("tokens_output"),
    ) {
        (Some(input), Some(output)) => Some(TokenUsage {
            input: input as u32,
            output: output as u32,
        }),
        _ => None,
    };

    Ok(Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        role,
        content: row.get("content"),
        attachments,
        tokens,
        created_at: row.get("created_at"),
    })
}

async fn fetch_conversation<'e, E>(
    executor: E,
    id: &str,
    user_id: &str,
) -> AppResult<Option<Conversation>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM chat_conversations WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(executor)
    .await
    .map_err(|e| AppError::database(format!("Failed to get conversation: {e}")))?;

    Ok(row.as_ref().map(conversation_from_row))
}

/// Apply a partial update; not-found when no row matches `id` and `user_id`
async fn apply_update<'e, E>(
    executor: E,
    id: &str,
    user_id: &str,
    update: ConversationUpdate,
) -> AppResult<()>
where
    E: SqliteExecutor<'e>,
{
    let now = chrono::Utc::now().to_rfc3339();

    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE chat_conversations SET updated_at = ");
    builder.push_bind(now);
    if let Some(title) = update.title {
        builder.push(", title = ").push_bind(title);
    }
    if let Some(system_prompt) = update.system_prompt {
        builder.push(", system_prompt = ").push_bind(system_prompt);
    }
    if let Some(model) = update.model {
        builder.push(", model = ").push_bind(model);
    }
    if let Some(delta) = update.message_count_increment {
        builder
            .push(", message_count = message_count + ")
            .push_bind(delta);
    }
    builder
        .push(" WHERE id = ")
        .push_bind(id.to_owned())
        .push(" AND user_id = ")
        .push_bind(user_id.to_owned());

    let result = builder
        .build()
        .execute(executor)
        .await
        .map_err(|e| AppError::database(format!("Failed to update conversation: {e}")))?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Conversation"));
    }
    Ok(())
}

async fn insert_message<'e, E>(
    executor: E,
    conversation_id: &str,
    data: NewMessage,
) -> AppResult<Message>
where
    E: SqliteExecutor<'e>,
{
    let message = Message {
        id: Uuid::new_v4().to_string(),
        conversation_id: conversation_id.to_owned(),
        role: data.role,
        content: data.content,
        attachments: data.attachments,
        tokens: data.tokens,
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    let attachments_json = message
        .attachments
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r"
        INSERT INTO chat_messages (id, conversation_id, role, content, attachments, tokens_input, tokens_output, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ",
    )
    .bind(&message.id)
    .bind(&message.conversation_id)
    .bind(message.role.as_str())
    .bind(&message.content)
    .bind(attachments_json)
    .bind(message.tokens.map(|t| i64::from(t.input)))
    .bind(message.tokens.map(|t| i64::from(t.output)))
    .bind(&message.created_at)
    .execute(executor)
    .await
    .map_err(|e| AppError::database(format!("Failed to create message: {e}")))?;

    Ok(message)
}

#[async_trait]
impl ChatStore for SqliteChatStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Database ping failed: {e}")))?;
        Ok(())
    }

    async fn create_conversation(
        &self,
        user_id: &str,
        data: NewConversation,
    ) -> AppResult<Conversation> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let conversation = Conversation {
            id,
            user_id: user_id.to_owned(),
            title: data
                .title
                .unwrap_or_else(|| defaults::CONVERSATION_TITLE.to_owned()),
            system_prompt: data
                .system_prompt
                .unwrap_or_else(|| defaults::SYSTEM_PROMPT.to_owned()),
            model: data.model.unwrap_or_else(|| self.default_model.clone()),
            message_count: 0,
            created_at: now.clone(),
            updated_at: now,
        };

        sqlx::query(
            r"
            INSERT INTO chat_conversations (id, user_id, title, system_prompt, model, message_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 0, $6, $7)
            ",
        )
        .bind(&conversation.id)
        .bind(&conversation.user_id)
        .bind(&conversation.title)
        .bind(&conversation.system_prompt)
        .bind(&conversation.model)
        .bind(&conversation.created_at)
        .bind(&conversation.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create conversation: {e}")))?;

        debug!(conversation_id = %conversation.id, user_id, "Created conversation");
        Ok(conversation)
    }

    async fn get_conversation(&self, id: &str, user_id: &str) -> AppResult<Option<Conversation>> {
        fetch_conversation(&self.pool, id, user_id).await
    }

    async fn list_conversations(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> AppResult<(Vec<Conversation>, i64)> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {CONVERSATION_COLUMNS}
            FROM chat_conversations
            WHERE user_id = $1
            ORDER BY updated_at DESC, rowid DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(user_id)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list conversations: {e}")))?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chat_conversations WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::database(format!("Failed to count conversations: {e}")))?;

        Ok((rows.iter().map(conversation_from_row).collect(), total))
    }

    async fn update_conversation(
        &self,
        id: &str,
        user_id: &str,
        update: ConversationUpdate,
    ) -> AppResult<Conversation> {
        apply_update(&self.pool, id, user_id, update).await?;
        fetch_conversation(&self.pool, id, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation"))
    }

    async fn delete_conversation(&self, id: &str, user_id: &str) -> AppResult<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")))?;

        let owned: Option<String> =
            sqlx::query_scalar("SELECT id FROM chat_conversations WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to get conversation: {e}")))?;

        if owned.is_none() {
            return Ok(false);
        }

        sqlx::query("DELETE FROM chat_messages WHERE conversation_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete messages: {e}")))?;

        sqlx::query("DELETE FROM chat_conversations WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete conversation: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit delete: {e}")))?;

        debug!(conversation_id = id, user_id, "Deleted conversation");
        Ok(true)
    }

    async fn create_message(&self, conversation_id: &str, data: NewMessage) -> AppResult<Message> {
        insert_message(&self.pool, conversation_id, data).await
    }

    async fn complete_turn(
        &self,
        conversation_id: &str,
        user_id: &str,
        assistant: NewMessage,
        update: ConversationUpdate,
    ) -> AppResult<(Message, Conversation)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")))?;

        let message = insert_message(&mut *tx, conversation_id, assistant).await?;
        apply_update(&mut *tx, conversation_id, user_id, update).await?;
        let conversation = fetch_conversation(&mut *tx, conversation_id, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation"))?;

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit turn: {e}")))?;

        debug!(conversation_id, message_id = %message.id, "Completed turn");
        Ok((message, conversation))
    }

    async fn get_recent_messages(
        &self,
        conversation_id: &str,
        limit: u32,
    ) -> AppResult<Vec<Message>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {MESSAGE_COLUMNS}
            FROM chat_messages
            WHERE conversation_id = $1
            ORDER BY rowid DESC
            LIMIT $2
            "
        ))
        .bind(conversation_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get recent messages: {e}")))?;

        // Newest-first from the query; callers want chronological order
        let mut messages = rows
            .iter()
            .map(message_from_row)
            .collect::<AppResult<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> AppResult<MessagePage> {
        let fetch = i64::from(limit) + 1;
        let rows = match before {
            Some(cursor) => {
                sqlx::query(&format!(
                    r"
                    SELECT {MESSAGE_COLUMNS}
                    FROM chat_messages
                    WHERE conversation_id = $1
                      AND rowid < (SELECT rowid FROM chat_messages WHERE id = $2 AND conversation_id = $1)
                    ORDER BY rowid DESC
                    LIMIT $3
                    "
                ))
                .bind(conversation_id)
                .bind(cursor)
                .bind(fetch)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    r"
                    SELECT {MESSAGE_COLUMNS}
                    FROM chat_messages
                    WHERE conversation_id = $1
                    ORDER BY rowid DESC
                    LIMIT $2
                    "
                ))
                .bind(conversation_id)
                .bind(fetch)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| AppError::database(format!("Failed to list messages: {e}")))?;

        let has_more = rows.len() > limit as usize;
        let mut messages = rows
            .iter()
            .take(limit as usize)
            .map(message_from_row)
            .collect::<AppResult<Vec<_>>>()?;
        messages.reverse();

        Ok(MessagePage { messages, has_more })
    }
}
