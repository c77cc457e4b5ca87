// ABOUTME: Best-effort conversation title generation from the first turn of a conversation
// ABOUTME: Every failure yields no title so the caller keeps the existing one
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use tracing::{debug, warn};

use crate::constants::{completion, defaults, prompts};
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};

use super::attachments::ResolvedAttachments;

const QUOTE_CHARS: &[char] = &['"', '\'', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}', '`'];

/// Text the title is generated from
///
/// Falls back to a description of the attachments when the user sent no text.
#[must_use]
pub fn title_seed(content: &str, attachments: &ResolvedAttachments) -> String {
    let trimmed = content.trim();
    if !trimmed.is_empty() {
        return trimmed.to_owned();
    }
    if !attachments.image_urls.is_empty() {
        return prompts::IMAGE_TITLE_SEED.to_owned();
    }
    attachments.text_blocks.first().map_or_else(
        || defaults::CONVERSATION_TITLE.to_owned(),
        |block| format!("{}{}", prompts::FILE_TITLE_SEED_PREFIX, block.name),
    )
}

/// Normalize a model-produced title; `None` when nothing usable remains
#[must_use]
pub fn clean_title(raw: &str) -> Option<String> {
    let first_line = raw.trim().lines().next().unwrap_or_default();
    let cleaned: String = first_line
        .trim()
        .trim_matches(QUOTE_CHARS)
        .trim()
        .chars()
        .take(completion::TITLE_MAX_CHARS)
        .collect();
    let cleaned = cleaned.trim_end().to_owned();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Ask the model for a short title for `seed`
///
/// Returns `None` on any failure: transport, backend error or empty output.
pub async fn generate_title(provider: &dyn LlmProvider, seed: &str) -> Option<String> {
    let input: String = seed.chars().take(completion::TITLE_INPUT_CHARS).collect();
    let request = ChatRequest::new(vec![
        ChatMessage::system(prompts::TITLE_SYSTEM_PROMPT),
        ChatMessage::user(input),
    ])
    .with_temperature(completion::TITLE_TEMPERATURE)
    .with_max_tokens(completion::TITLE_MAX_TOKENS);

    match provider.complete(&request).await {
        Ok(response) => {
            let title = clean_title(&response.content);
            if title.is_none() {
                debug!("Title model returned no usable text");
            }
            title
        }
        Err(e) => {
            warn!(error = %e, "Title generation failed");
            None
        }
    }
}
