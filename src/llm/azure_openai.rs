// ABOUTME: Chat-completions client for Azure OpenAI deployments and OpenAI-compatible endpoints
// ABOUTME: Maps HTTP failures to typed errors and parses SSE chunks into normalized completion events
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Azure OpenAI provider
//!
//! Two URL forms are supported:
//!
//! - **Azure deployment**: `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version=...`
//!   authenticated with the `api-key` header
//! - **OpenAI-compatible**: `{endpoint}/chat/completions` authenticated with a
//!   bearer token (used when no deployment is configured)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use super::sse_parser::{completion_event_stream, ChunkUpdate};
use super::{
    ChatMessage, ChatRequest, ChatResponse, CompletionStream, FinishReason, LlmProvider,
    TokenUsage,
};
use crate::config::LlmConfig;
use crate::constants::service_names::COMPLETION_BACKEND;
use crate::errors::{AppError, ErrorCode};

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl From<ApiUsage> for TokenUsage {
    fn from(usage: ApiUsage) -> Self {
        Self {
            input: usage.prompt_tokens,
            output: usage.completion_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiStreamChunk {
    #[serde(default)]
    choices: Vec<ApiStreamChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiStreamChoice {
    #[serde(default)]
    delta: Option<ApiStreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiStreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

// ============================================================================
// Provider
// ============================================================================

/// Resolved connection settings
#[derive(Clone)]
pub struct AzureOpenAiConfig {
    /// Resource endpoint or base URL
    pub endpoint: String,
    /// API key
    pub api_key: String,
    /// Deployment name; `None` selects the OpenAI-compatible URL form
    pub deployment: Option<String>,
    /// Azure `api-version`
    pub api_version: String,
    /// Model sent when a request names none
    pub default_model: String,
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Ask the backend to append a usage chunk to streamed responses
    pub include_stream_usage: bool,
}

impl From<&LlmConfig> for AzureOpenAiConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            deployment: config.deployment.clone(),
            api_version: config.api_version.clone(),
            default_model: config.model.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            include_stream_usage: true,
        }
    }
}

/// [`LlmProvider`] backed by the chat-completions HTTP API
pub struct AzureOpenAiProvider {
    client: Client,
    config: AzureOpenAiConfig,
}

impl AzureOpenAiProvider {
    /// Create a provider
    ///
    /// No overall request timeout is set on the client: streamed replies can
    /// legitimately run for minutes and are bounded by the turn timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(config: AzureOpenAiConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {e}")))?;

        info!(
            endpoint = %config.endpoint,
            deployment = config.deployment.as_deref().unwrap_or("-"),
            model = %config.default_model,
            "Initializing completion provider"
        );

        Ok(Self { client, config })
    }

    /// Chat-completions URL for the configured form
    #[must_use]
    pub fn completions_url(&self) -> String {
        let base = self.config.endpoint.trim_end_matches('/');
        match &self.config.deployment {
            Some(deployment) => format!(
                "{base}/openai/deployments/{deployment}/chat/completions?api-version={}",
                self.config.api_version
            ),
            None => format!("{base}/chat/completions"),
        }
    }

    fn add_auth_header(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.api_key.is_empty() {
            request
        } else if self.config.deployment.is_some() {
            request.header("api-key", &self.config.api_key)
        } else {
            request.header("Authorization", format!("Bearer {}", self.config.api_key))
        }
    }

    fn build_body<'a>(&'a self, request: &'a ChatRequest, stream: bool) -> ApiRequest<'a> {
        // Azure routes by deployment; the model field is only meaningful for the plain form
        let model = if self.config.deployment.is_some() {
            None
        } else {
            Some(
                request
                    .model
                    .as_deref()
                    .unwrap_or(&self.config.default_model),
            )
        };
        ApiRequest {
            model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream,
            stream_options: (stream && self.config.include_stream_usage)
                .then_some(StreamOptions { include_usage: true }),
        }
    }

    async fn send(&self, body: &ApiRequest<'_>) -> Result<reqwest::Response, AppError> {
        let http_request = self
            .client
            .post(self.completions_url())
            .header("Content-Type", "application/json")
            .json(body);

        let response = self.add_auth_header(http_request).send().await.map_err(|e| {
            error!(error = %e, "Failed to send completion request");
            if e.is_connect() || e.is_timeout() {
                AppError::external_unavailable(COMPLETION_BACKEND, format!("Cannot connect: {e}"))
            } else {
                AppError::external_service(COMPLETION_BACKEND, format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Self::parse_error_response(status, &body))
    }

    /// Map a non-success response to a typed error
    fn parse_error_response(status: reqwest::StatusCode, body: &str) -> AppError {
        let detail = serde_json::from_str::<ApiErrorResponse>(body).map_or_else(
            |_| body.chars().take(200).collect::<String>(),
            |parsed| match parsed.error.code {
                Some(code) => format!("{code}: {}", parsed.error.message),
                None => parsed.error.message,
            },
        );

        warn!(status = status.as_u16(), detail = %detail, "Completion backend returned an error");

        match status.as_u16() {
            401 | 403 => AppError::new(
                ErrorCode::ExternalAuthFailed,
                format!("{COMPLETION_BACKEND} authentication failed: {detail}"),
            ),
            429 => AppError::new(
                ErrorCode::ExternalRateLimited,
                format!("{COMPLETION_BACKEND} is rate limiting requests, please retry shortly"),
            ),
            400 => AppError::external_service(
                COMPLETION_BACKEND,
                format!("Request rejected: {detail}"),
            ),
            404 => AppError::external_service(
                COMPLETION_BACKEND,
                format!("Model or deployment not found: {detail}"),
            ),
            502..=504 => AppError::external_unavailable(COMPLETION_BACKEND, detail),
            _ => AppError::external_service(COMPLETION_BACKEND, format!("HTTP {status}: {detail}")),
        }
    }

    /// Parse one streamed `data:` payload
    fn parse_stream_chunk(payload: &str) -> Result<ChunkUpdate, AppError> {
        let chunk: ApiStreamChunk = serde_json::from_str(payload).map_err(|e| {
            error!(error = %e, "Failed to parse stream chunk");
            AppError::external_service(COMPLETION_BACKEND, format!("Malformed stream chunk: {e}"))
        })?;

        // Azure sends a leading prompt-filter chunk and a trailing usage chunk with no choices
        let choice = chunk.choices.into_iter().next();
        Ok(ChunkUpdate {
            delta: choice
                .as_ref()
                .and_then(|c| c.delta.as_ref())
                .and_then(|d| d.content.clone()),
            finish_reason: choice
                .and_then(|c| c.finish_reason)
                .map(|r| FinishReason::from_api(&r)),
            usage: chunk.usage.map(TokenUsage::from),
        })
    }
}

#[async_trait]
impl LlmProvider for AzureOpenAiProvider {
    fn name(&self) -> &'static str {
        if self.config.deployment.is_some() {
            "azure-openai"
        } else {
            "openai-compatible"
        }
    }

    #[instrument(skip(self, request), fields(model = %request.model.as_deref().unwrap_or(&self.config.default_model)))]
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        debug!(messages = request.messages.len(), "Sending completion request");

        let response = self.send(&self.build_body(request, false)).await?;
        let body = response.text().await.map_err(|e| {
            AppError::external_service(COMPLETION_BACKEND, format!("Failed to read response: {e}"))
        })?;

        let parsed: ApiResponse = serde_json::from_str(&body).map_err(|e| {
            error!(error = %e, "Failed to parse completion response");
            AppError::external_service(COMPLETION_BACKEND, format!("Failed to parse response: {e}"))
        })?;

        let choice =
            parsed.choices.into_iter().next().ok_or_else(|| {
                AppError::external_service(COMPLETION_BACKEND, "API returned no choices")
            })?;

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            model: parsed.model,
            usage: parsed.usage.map(TokenUsage::from),
            finish_reason: choice
                .finish_reason
                .as_deref()
                .map_or(FinishReason::Stop, FinishReason::from_api),
        })
    }

    #[instrument(skip(self, request), fields(model = %request.model.as_deref().unwrap_or(&self.config.default_model)))]
    async fn complete_stream(&self, request: &ChatRequest) -> Result<CompletionStream, AppError> {
        debug!(messages = request.messages.len(), "Sending streaming completion request");

        let response = self.send(&self.build_body(request, true)).await?;
        Ok(completion_event_stream(
            response.bytes_stream(),
            Self::parse_stream_chunk,
            COMPLETION_BACKEND,
        ))
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<bool, AppError> {
        let probe = ChatRequest::new(vec![ChatMessage::user("ping")]).with_max_tokens(1);
        match self.complete(&probe).await {
            Ok(_) => Ok(true),
            Err(e) if e.code == ErrorCode::ExternalServiceUnavailable => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(deployment: Option<&str>) -> AzureOpenAiProvider {
        AzureOpenAiProvider::new(AzureOpenAiConfig {
            endpoint: "https://example.openai.azure.com/".into(),
            api_key: "key".into(),
            deployment: deployment.map(ToOwned::to_owned),
            api_version: "2024-08-06".into(),
            default_model: "gpt-4o".into(),
            connect_timeout: Duration::from_secs(5),
            include_stream_usage: true,
        })
        .unwrap()
    }

    #[test]
    fn test_completions_url_forms() {
        assert_eq!(
            provider(Some("chat")).completions_url(),
            "https://example.openai.azure.com/openai/deployments/chat/chat/completions?api-version=2024-08-06"
        );
        assert_eq!(
            provider(None).completions_url(),
            "https://example.openai.azure.com/chat/completions"
        );
    }

    #[test]
    fn test_stream_body_requests_usage() {
        let provider = provider(None);
        let request = ChatRequest::new(vec![ChatMessage::user("hi")])
            .with_temperature(0.7)
            .with_max_tokens(4096);
        let body = serde_json::to_value(provider.build_body(&request, true)).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["max_tokens"], 4096);

        let body = serde_json::to_value(provider.build_body(&request, false)).unwrap();
        assert!(body.get("stream_options").is_none());
    }

    #[test]
    fn test_azure_body_omits_model() {
        let provider = provider(Some("chat"));
        let request = ChatRequest::new(vec![ChatMessage::user("hi")]);
        let body = serde_json::to_value(provider.build_body(&request, false)).unwrap();
        assert!(body.get("model").is_none());
    }

    #[test]
    fn test_parse_stream_chunks() {
        let update = AzureOpenAiProvider::parse_stream_chunk(
            r#"{"choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(update.delta.as_deref(), Some("Hi"));
        assert!(update.finish_reason.is_none());

        let update = AzureOpenAiProvider::parse_stream_chunk(
            r#"{"choices":[],"usage":{"prompt_tokens":9,"completion_tokens":4,"total_tokens":13}}"#,
        )
        .unwrap();
        assert_eq!(update.usage, Some(TokenUsage { input: 9, output: 4 }));
        assert!(update.delta.is_none());

        let update = AzureOpenAiProvider::parse_stream_chunk(
            r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(update.finish_reason, Some(FinishReason::Stop));

        assert!(AzureOpenAiProvider::parse_stream_chunk("{oops").is_err());
    }

    #[test]
    fn test_error_mapping() {
        let err = AzureOpenAiProvider::parse_error_response(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"slow down","code":"429"}}"#,
        );
        assert_eq!(err.code, ErrorCode::ExternalRateLimited);

        let err = AzureOpenAiProvider::parse_error_response(
            reqwest::StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"bad key"}}"#,
        );
        assert_eq!(err.code, ErrorCode::ExternalAuthFailed);

        let err = AzureOpenAiProvider::parse_error_response(
            reqwest::StatusCode::BAD_GATEWAY,
            "<html>bad gateway</html>",
        );
        assert_eq!(err.code, ErrorCode::ExternalServiceUnavailable);
    }
}
