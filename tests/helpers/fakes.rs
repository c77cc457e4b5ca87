// ABOUTME: Scripted completion backend and in-memory object store for tests
// ABOUTME: Replays fixed deltas, injects failures and stalls, and records every request
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chatstream::constants::prompts;
use chatstream::errors::AppError;
use chatstream::llm::{
    ChatRequest, ChatResponse, CompletionEvent, CompletionStream, FinishReason, LlmProvider,
    TokenUsage,
};
use chatstream::storage::ObjectStore;
use futures_util::stream::{self, StreamExt};

/// Usage reported by every scripted reply
pub const SCRIPTED_USAGE: TokenUsage = TokenUsage {
    input: 12,
    output: 5,
};

/// How the scripted reply ends
#[derive(Debug, Clone)]
pub enum Ending {
    /// Finish normally with `stop`
    Finish,
    /// Yield an upstream error instead of finishing
    Fail(String),
    /// Never yield another chunk
    Stall,
    /// Keep yielding a `"."` delta every interval, never finishing
    Trickle(Duration),
}

/// Completion backend replaying a fixed script
pub struct ScriptedLlm {
    deltas: Vec<String>,
    ending: Ending,
    title: Option<String>,
    requests: Mutex<Vec<ChatRequest>>,
    title_calls: AtomicUsize,
}

impl ScriptedLlm {
    /// Reply with `deltas` and finish normally; titles come back as `"Scripted title"`
    pub fn replying(deltas: &[&str]) -> Self {
        Self {
            deltas: deltas.iter().map(|d| (*d).to_owned()).collect(),
            ending: Ending::Finish,
            title: Some("Scripted title".to_owned()),
            requests: Mutex::new(Vec::new()),
            title_calls: AtomicUsize::new(0),
        }
    }

    /// Change how the reply ends
    #[must_use]
    pub fn ending(mut self, ending: Ending) -> Self {
        self.ending = ending;
        self
    }

    /// Reply text for title requests; `None` makes title requests fail
    #[must_use]
    pub fn title(mut self, title: Option<&str>) -> Self {
        self.title = title.map(ToOwned::to_owned);
        self
    }

    /// Non-title requests received so far
    pub fn turn_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of title requests received
    pub fn title_calls(&self) -> usize {
        self.title_calls.load(Ordering::SeqCst)
    }

    fn is_title_request(request: &ChatRequest) -> bool {
        request
            .messages
            .first()
            .is_some_and(|m| m.content.text() == prompts::TITLE_SYSTEM_PROMPT)
    }

    fn full_text(&self) -> String {
        self.deltas.concat()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        if Self::is_title_request(request) {
            self.title_calls.fetch_add(1, Ordering::SeqCst);
            return self.title.clone().map_or_else(
                || {
                    Err(AppError::external_service(
                        "scripted",
                        "title backend unavailable",
                    ))
                },
                |title| {
                    Ok(ChatResponse {
                        content: title,
                        model: "scripted-model".into(),
                        usage: None,
                        finish_reason: FinishReason::Stop,
                    })
                },
            );
        }

        self.requests.lock().unwrap().push(request.clone());
        match &self.ending {
            Ending::Finish => Ok(ChatResponse {
                content: self.full_text(),
                model: "scripted-model".into(),
                usage: Some(SCRIPTED_USAGE),
                finish_reason: FinishReason::Stop,
            }),
            Ending::Fail(message) => Err(AppError::external_service("scripted", message.clone())),
            Ending::Stall | Ending::Trickle(_) => std::future::pending().await,
        }
    }

    async fn complete_stream(&self, request: &ChatRequest) -> Result<CompletionStream, AppError> {
        self.requests.lock().unwrap().push(request.clone());

        let deltas = stream::iter(
            self.deltas
                .clone()
                .into_iter()
                .map(|delta| Ok::<_, AppError>(CompletionEvent::ContentDelta { delta })),
        );

        let stream: CompletionStream = match &self.ending {
            Ending::Finish => Box::pin(deltas.chain(stream::once(async {
                Ok(CompletionEvent::Finish {
                    reason: FinishReason::Stop,
                    usage: Some(SCRIPTED_USAGE),
                })
            }))),
            Ending::Fail(message) => {
                let error = AppError::external_service("scripted", message.clone());
                Box::pin(deltas.chain(stream::once(async move { Err(error) })))
            }
            Ending::Stall => Box::pin(deltas.chain(stream::pending())),
            Ending::Trickle(interval) => {
                let interval = *interval;
                let ticks = stream::unfold((), move |()| async move {
                    tokio::time::sleep(interval).await;
                    let delta = ".".to_owned();
                    Some((Ok::<_, AppError>(CompletionEvent::ContentDelta { delta }), ()))
                });
                Box::pin(deltas.chain(ticks))
            }
        };
        Ok(stream)
    }

    async fn health_check(&self) -> Result<bool, AppError> {
        Ok(true)
    }
}

/// Object store serving fixed bodies by URL; unknown URLs fail
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: HashMap<String, String>,
    fetches: AtomicUsize,
}

impl MemoryObjectStore {
    /// Serve `body` at `url`
    #[must_use]
    pub fn with_object(mut self, url: &str, body: &str) -> Self {
        self.objects.insert(url.to_owned(), body.to_owned());
        self
    }

    /// Number of fetch attempts, successful or not
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn fetch_text(&self, url: &str) -> Option<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.objects.get(url).cloned()
    }
}
