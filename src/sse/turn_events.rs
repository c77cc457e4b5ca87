// ABOUTME: Chat-turn events and their text/event-stream encoding
// ABOUTME: message_start, content_delta, message_end and error with camelCase JSON payloads
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use axum::response::sse::Event;
use serde::Serialize;

use crate::models::TokenUsage;

/// Event emitted while a chat turn runs
///
/// A turn emits exactly one `MessageStart`, any number of `ContentDelta`, then
/// exactly one of `MessageEnd` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TurnEvent {
    /// The user message has been persisted
    #[serde(rename_all = "camelCase")]
    MessageStart {
        /// Persisted user message ID
        user_message_id: String,
    },
    /// Next fragment of the assistant reply
    ContentDelta {
        /// Text fragment
        delta: String,
    },
    /// The assistant message has been persisted
    #[serde(rename_all = "camelCase")]
    MessageEnd {
        /// Persisted assistant message ID
        message_id: String,
        /// Usage of the completion
        tokens: TokenUsage,
        /// Title generated on the conversation's first turn
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_title: Option<String>,
    },
    /// The turn failed
    Error {
        /// Client-safe description
        error: String,
    },
}

impl TurnEvent {
    /// SSE `event:` name
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::MessageStart { .. } => "message_start",
            Self::ContentDelta { .. } => "content_delta",
            Self::MessageEnd { .. } => "message_end",
            Self::Error { .. } => "error",
        }
    }

    /// Whether no event may follow this one
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::MessageEnd { .. } | Self::Error { .. })
    }

    /// JSON payload for the SSE `data:` field
    #[must_use]
    pub fn payload(&self) -> String {
        // Every variant is plain strings and integers
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }

    /// Encode as an axum SSE event
    #[must_use]
    pub fn to_sse_event(&self) -> Event {
        Event::default().event(self.event_name()).data(self.payload())
    }
}
