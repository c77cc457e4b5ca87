// ABOUTME: Completion backend abstraction with a uniform content-delta/finish event stream
// ABOUTME: Defines chat messages with multi-part vision content, requests, responses and the provider trait
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Completion backend
//!
//! Every backend call is normalized into a [`CompletionStream`]: zero or more
//! [`CompletionEvent::ContentDelta`] in generation order, then exactly one
//! [`CompletionEvent::Finish`]. A failure at any point is yielded as the
//! stream's `Err` item and nothing follows it.
//!
//! Non-streaming responses are turned into the same sequence with
//! [`response_into_stream`] so callers can drive both paths with one loop.
//!
//! ```rust,no_run
//! use chatstream::llm::{ChatMessage, ChatRequest, LlmProvider};
//!
//! async fn example(provider: &dyn LlmProvider) {
//!     let request = ChatRequest::new(vec![
//!         ChatMessage::system("You are a helpful AI assistant."),
//!         ChatMessage::user("Explain backpressure in one paragraph."),
//!     ])
//!     .with_temperature(0.7);
//!     let response = provider.complete(&request).await;
//! }
//! ```

mod azure_openai;
pub mod sse_parser;

pub use azure_openai::{AzureOpenAiConfig, AzureOpenAiProvider};

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::stream;
use serde::{Deserialize, Serialize};
use tokio_stream::Stream;

use crate::constants::completion;
use crate::errors::AppError;
pub use crate::models::{MessageRole, TokenUsage};

// ============================================================================
// Messages
// ============================================================================

/// Image reference inside a multi-part message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// Publicly readable image URL
    pub url: String,
    /// Vision detail level
    pub detail: String,
}

/// One part of a multi-part message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text part
    Text {
        /// Text body
        text: String,
    },
    /// Image part
    ImageUrl {
        /// Image reference
        image_url: ImageUrl,
    },
}

/// Message body: plain text, or text plus images
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text
    Text(String),
    /// Ordered parts
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated text of all text parts
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect(),
        }
    }

    /// Image URLs in part order
    #[must_use]
    pub fn image_urls(&self) -> Vec<&str> {
        match self {
            Self::Text(_) => Vec::new(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::ImageUrl { image_url } => Some(image_url.url.as_str()),
                    ContentPart::Text { .. } => None,
                })
                .collect(),
        }
    }
}

/// A single message sent to the completion backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: MessageRole,
    /// Message body
    pub content: MessageContent,
}

impl ChatMessage {
    /// Create a text message
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Create a user message with one text part followed by one part per image
    #[must_use]
    pub fn user_with_images<I, S>(text: impl Into<String>, image_urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parts = vec![ContentPart::Text { text: text.into() }];
        parts.extend(image_urls.into_iter().map(|url| ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: url.into(),
                detail: completion::IMAGE_DETAIL.to_owned(),
            },
        }));
        Self {
            role: MessageRole::User,
            content: MessageContent::Parts(parts),
        }
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Configuration for a chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Conversation messages
    pub messages: Vec<ChatMessage>,
    /// Model identifier (provider-specific)
    pub model: Option<String>,
    /// Temperature for response randomness (0.0 - 2.0)
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Create a new chat request with messages
    #[must_use]
    pub const fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the model to use
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the temperature
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum tokens
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Why generation stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of the reply
    Stop,
    /// Output token cap reached
    Length,
    /// Output withheld by the backend's content filter
    ContentFilter,
    /// Any other backend-specific reason
    Other(String),
}

impl FinishReason {
    /// Parse the backend's `finish_reason` string
    #[must_use]
    pub fn from_api(value: &str) -> Self {
        match value {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "content_filter" => Self::ContentFilter,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// Response from a non-streaming completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Generated message content
    pub content: String,
    /// Model used for generation
    pub model: String,
    /// Token usage statistics
    pub usage: Option<TokenUsage>,
    /// Why generation stopped
    pub finish_reason: FinishReason,
}

/// One event of a normalized completion stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionEvent {
    /// Next fragment of generated text
    ContentDelta {
        /// Text fragment
        delta: String,
    },
    /// Generation finished; always the last event
    Finish {
        /// Why generation stopped
        reason: FinishReason,
        /// Usage when the backend reported it
        usage: Option<TokenUsage>,
    },
}

/// Stream type for normalized completion output
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<CompletionEvent, AppError>> + Send>>;

/// Present a buffered response as a one-delta completion stream
#[must_use]
pub fn response_into_stream(response: ChatResponse) -> CompletionStream {
    let mut events = Vec::with_capacity(2);
    if !response.content.is_empty() {
        events.push(Ok(CompletionEvent::ContentDelta {
            delta: response.content,
        }));
    }
    events.push(Ok(CompletionEvent::Finish {
        reason: response.finish_reason,
        usage: response.usage,
    }));
    Box::pin(stream::iter(events))
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Token-generation backend
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider name for logs
    fn name(&self) -> &'static str;

    /// Perform a non-streaming completion
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AppError>;

    /// Perform a streaming completion
    ///
    /// Connection and HTTP status errors are returned directly; errors after
    /// the response started are yielded by the stream.
    async fn complete_stream(&self, request: &ChatRequest) -> Result<CompletionStream, AppError>;

    /// Check whether the backend is reachable
    async fn health_check(&self) -> Result<bool, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[test]
    fn test_multipart_wire_form() {
        let message = ChatMessage::user_with_images("what is this", ["https://img/1.png"]);
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][0]["text"], "what is this");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(json["content"][1]["image_url"]["url"], "https://img/1.png");
        assert_eq!(json["content"][1]["image_url"]["detail"], "auto");
    }

    #[test]
    fn test_plain_text_wire_form() {
        let json = serde_json::to_value(ChatMessage::system("be brief")).unwrap();
        assert_eq!(json["content"], "be brief");
    }

    #[test]
    fn test_finish_reason_parsing() {
        assert_eq!(FinishReason::from_api("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::from_api("length"), FinishReason::Length);
        assert_eq!(
            FinishReason::from_api("tool_calls"),
            FinishReason::Other("tool_calls".into())
        );
    }

    #[tokio::test]
    async fn test_response_into_stream() {
        let response = ChatResponse {
            content: "hello".into(),
            model: "gpt-4o".into(),
            usage: Some(TokenUsage { input: 3, output: 1 }),
            finish_reason: FinishReason::Stop,
        };
        let events: Vec<_> = response_into_stream(response)
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                CompletionEvent::ContentDelta {
                    delta: "hello".into()
                },
                CompletionEvent::Finish {
                    reason: FinishReason::Stop,
                    usage: Some(TokenUsage { input: 3, output: 1 }),
                },
            ]
        );
    }
}
