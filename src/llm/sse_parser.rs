// ABOUTME: SSE line-buffering parser that turns a completion byte stream into normalized events
// ABOUTME: Handles partial lines across network chunks, multiple events per chunk and the [DONE] marker
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # SSE stream parser
//!
//! Network chunks do not line up with SSE event boundaries. [`SseLineBuffer`]
//! keeps the trailing partial line between chunks and emits complete `data:`
//! payloads only.
//!
//! [`completion_event_stream`] drives the buffer over a byte stream and applies
//! a provider-specific chunk parser. The finish event is held back until the
//! backend ends the stream so a trailing usage-only chunk can still be
//! attached to it.

use std::mem;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};

use super::{CompletionEvent, CompletionStream, FinishReason, TokenUsage};
use crate::errors::AppError;

/// A parsed SSE event from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A `data:` payload (prefix stripped)
    Data(String),
    /// The `[DONE]` termination signal
    Done,
}

/// Line-buffering SSE parser
///
/// Buffers raw bytes so that a multi-byte character split across two network
/// chunks is decoded only once its line is complete.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    /// Bytes not yet terminated by a newline
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    /// Create an empty line buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a network chunk and return every event completed by it
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Parse whatever remains once the byte stream has ended
    pub fn flush(&mut self) -> Option<SseEvent> {
        let rest = mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
    }
}

/// Parse one SSE line; blank lines, comments and non-data fields yield nothing
fn parse_line(line: &str) -> Option<SseEvent> {
    let trimmed = line.trim();
    let payload = trimmed
        .strip_prefix("data:")
        .map(str::trim_start)
        .filter(|data| !data.is_empty())?;

    if payload == "[DONE]" {
        Some(SseEvent::Done)
    } else {
        Some(SseEvent::Data(payload.to_owned()))
    }
}

/// What one backend chunk contributed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkUpdate {
    /// Text fragment, if any
    pub delta: Option<String>,
    /// Finish reason, if this chunk ended generation
    pub finish_reason: Option<FinishReason>,
    /// Usage, if this chunk reported it
    pub usage: Option<TokenUsage>,
}

/// Accumulated end-of-stream facts
#[derive(Debug, Default)]
struct FinishState {
    reason: Option<FinishReason>,
    usage: Option<TokenUsage>,
}

impl FinishState {
    fn absorb(&mut self, update: &ChunkUpdate) {
        if let Some(reason) = &update.finish_reason {
            self.reason = Some(reason.clone());
        }
        if update.usage.is_some() {
            self.usage = update.usage;
        }
    }

    fn into_event(self) -> Option<CompletionEvent> {
        self.reason.map(|reason| CompletionEvent::Finish {
            reason,
            usage: self.usage,
        })
    }
}

/// Build a normalized completion stream from an SSE byte stream
///
/// * `parse_chunk` converts one `data:` JSON payload into a [`ChunkUpdate`]
/// * `provider_name` is used in error messages
///
/// The stream ends with exactly one `Finish` when the backend sent `[DONE]`
/// or closed the connection after reporting a finish reason. A connection
/// that closes before either, a read error, or a payload that fails to parse
/// ends the stream with an `Err`.
pub fn completion_event_stream<S, F>(
    byte_stream: S,
    parse_chunk: F,
    provider_name: &'static str,
) -> CompletionStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    F: Fn(&str) -> Result<ChunkUpdate, AppError> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut byte_stream = Box::pin(byte_stream);
        let mut parser = SseLineBuffer::new();
        let mut finish = FinishState::default();

        loop {
            let (events, ended) = match byte_stream.next().await {
                Some(Ok(bytes)) => (parser.feed(&bytes), false),
                Some(Err(e)) => {
                    warn!(provider = provider_name, error = %e, "Completion stream read failed");
                    yield Err(AppError::external_service(
                        provider_name,
                        format!("Stream read error: {e}"),
                    ));
                    return;
                }
                None => (parser.flush().into_iter().collect(), true),
            };

            for event in events {
                match event {
                    SseEvent::Data(payload) => match parse_chunk(&payload) {
                        Ok(update) => {
                            finish.absorb(&update);
                            if let Some(delta) = update.delta.filter(|d| !d.is_empty()) {
                                yield Ok(CompletionEvent::ContentDelta { delta });
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    },
                    SseEvent::Done => {
                        debug!(provider = provider_name, "Completion stream done");
                        let state = mem::take(&mut finish);
                        let usage = state.usage;
                        yield Ok(state.into_event().unwrap_or(CompletionEvent::Finish {
                            reason: FinishReason::Stop,
                            usage,
                        }));
                        return;
                    }
                }
            }

            if ended {
                match mem::take(&mut finish).into_event() {
                    Some(event) => yield Ok(event),
                    None => yield Err(AppError::external_service(
                        provider_name,
                        "Stream ended before the completion finished",
                    )),
                }
                return;
            }
        }
    })
}
