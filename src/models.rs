// ABOUTME: Conversation, message and attachment domain types with camelCase wire form
// ABOUTME: Also carries the create/update payloads used by the chat store
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use serde::{Deserialize, Serialize};

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions that frame the conversation
    System,
    /// End user
    User,
    /// Model reply
    Assistant,
}

impl MessageRole {
    /// Stored and wire representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse the stored representation
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// Kind of uploaded attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    /// Picture passed to the model as vision input
    Image,
    /// Any other uploaded file
    File,
}

/// Reference to an uploaded object carried by a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    /// Upload identifier
    pub id: String,
    /// Attachment kind
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    /// Download URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Original filename
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Declared MIME type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Token accounting for one completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub input: u32,
    /// Completion tokens
    pub output: u32,
}

/// A chat conversation owned by one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Conversation ID
    pub id: String,
    /// Owner user ID
    pub user_id: String,
    /// Display title
    pub title: String,
    /// System prompt sent first on every turn
    pub system_prompt: String,
    /// Model identifier
    pub model: String,
    /// Number of persisted messages
    pub message_count: i64,
    /// RFC 3339 creation time
    pub created_at: String,
    /// RFC 3339 last update time
    pub updated_at: String,
}

/// A persisted chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message ID
    pub id: String,
    /// Owning conversation ID
    pub conversation_id: String,
    /// Author role
    pub role: MessageRole,
    /// Markdown text
    pub content: String,
    /// Attachments as submitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<AttachmentRef>>,
    /// Token usage of the completion that produced this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenUsage>,
    /// RFC 3339 creation time
    pub created_at: String,
}

/// Payload for creating a message
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Author role
    pub role: MessageRole,
    /// Markdown text
    pub content: String,
    /// Attachments as submitted
    pub attachments: Option<Vec<AttachmentRef>>,
    /// Token usage
    pub tokens: Option<TokenUsage>,
}

impl NewMessage {
    /// User message carrying the raw submitted content
    #[must_use]
    pub fn user(content: impl Into<String>, attachments: Vec<AttachmentRef>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            attachments: (!attachments.is_empty()).then_some(attachments),
            tokens: None,
        }
    }

    /// Assistant message with its usage record
    #[must_use]
    pub fn assistant(content: impl Into<String>, tokens: TokenUsage) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            attachments: None,
            tokens: Some(tokens),
        }
    }
}

/// Payload for creating a conversation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConversation {
    /// Title, defaults to the placeholder title
    #[serde(default)]
    pub title: Option<String>,
    /// System prompt, defaults to the assistant prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Model identifier, defaults to the configured model
    #[serde(default)]
    pub model: Option<String>,
}

/// Partial conversation update; `None` fields are left unchanged
#[derive(Debug, Clone, Default)]
pub struct ConversationUpdate {
    /// New title
    pub title: Option<String>,
    /// New system prompt
    pub system_prompt: Option<String>,
    /// New model identifier
    pub model: Option<String>,
    /// Amount added to the message count, applied atomically in the store
    pub message_count_increment: Option<i64>,
}

impl ConversationUpdate {
    /// Whether applying this update would change anything besides `updated_at`
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.system_prompt.is_none()
            && self.model.is_none()
            && self.message_count_increment.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_wire_form() {
        let attachment: AttachmentRef = serde_json::from_str(
            r#"{"id":"a1","type":"file","url":"https://x/y.md","fileName":"y.md","mimeType":"text/markdown"}"#,
        )
        .unwrap();
        assert_eq!(attachment.kind, AttachmentKind::File);
        assert_eq!(attachment.file_name.as_deref(), Some("y.md"));

        let json = serde_json::to_value(&attachment).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["mimeType"], "text/markdown");
    }

    #[test]
    fn test_message_omits_empty_optionals() {
        let message = Message {
            id: "m1".into(),
            conversation_id: "c1".into(),
            role: MessageRole::User,
            content: "hi".into(),
            attachments: None,
            tokens: None,
            created_at: "2025-01-01T00:00:00Z".into(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["conversationId"], "c1");
        assert_eq!(json["role"], "user");
        assert!(json.get("tokens").is_none());
        assert!(json.get("attachments").is_none());
    }

    #[test]
    fn test_new_user_message_drops_empty_attachment_list() {
        assert!(NewMessage::user("hi", Vec::new()).attachments.is_none());
    }

    #[test]
    fn test_role_round_trip_through_storage_form() {
        for role in [MessageRole::System, MessageRole::User, MessageRole::Assistant] {
            assert_eq!(MessageRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(MessageRole::parse("tool"), None);
    }
}
