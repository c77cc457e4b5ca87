// ABOUTME: Builds the ordered prompt for a turn: system prompt, bounded history, enhanced user message
// ABOUTME: Inlines text attachments as delimited blocks and attaches images as vision parts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::fmt::Write as _;

use crate::constants::prompts;
use crate::llm::ChatMessage;
use crate::models::{Message, MessageRole};

use super::attachments::{ResolvedAttachments, TextBlock};

/// Render the user's turn with default instructions and inlined file contents
///
/// Business rules:
/// - blank text with at least one image becomes the default image instruction
/// - each text block is appended after a separator, in attachment order
/// - blank text with only text blocks gets the "analyze" prefix instead
#[must_use]
pub fn enhance_user_content(content: &str, attachments: &ResolvedAttachments) -> String {
    let mut enhanced = if content.trim().is_empty() && !attachments.image_urls.is_empty() {
        prompts::DEFAULT_IMAGE_INSTRUCTION.to_owned()
    } else {
        content.to_owned()
    };

    if !attachments.text_blocks.is_empty() {
        let file_context = render_file_blocks(&attachments.text_blocks);
        if enhanced.trim().is_empty() {
            enhanced = format!("{}{file_context}", prompts::ANALYZE_FILES_INSTRUCTION);
        } else {
            enhanced.push_str(&file_context);
        }
    }

    enhanced
}

fn render_file_blocks(blocks: &[TextBlock]) -> String {
    let mut rendered = prompts::FILE_BLOCK_HEADER.to_owned();
    for block in blocks {
        // Writing to a String cannot fail
        let _ = write!(rendered, "\n[File: {}]\n```\n{}\n```\n", block.name, block.body);
    }
    rendered
}

/// Assemble the message list sent to the completion backend
///
/// History entries with a role other than user or assistant are skipped.
/// When images are present the final user message is multi-part: one text
/// part followed by one image part per URL.
#[must_use]
pub fn build_context(
    system_prompt: &str,
    history: &[Message],
    user_content: &str,
    attachments: &ResolvedAttachments,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));

    messages.extend(history.iter().filter_map(|message| match message.role {
        MessageRole::User | MessageRole::Assistant => {
            Some(ChatMessage::new(message.role, message.content.clone()))
        }
        MessageRole::System => None,
    }));

    let enhanced = enhance_user_content(user_content, attachments);
    if attachments.image_urls.is_empty() {
        messages.push(ChatMessage::user(enhanced));
    } else {
        messages.push(ChatMessage::user_with_images(
            enhanced,
            attachments.image_urls.iter().cloned(),
        ));
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ContentPart, MessageContent};

    fn history_message(role: MessageRole, content: &str) -> Message {
        Message {
            id: format!("{}-{content}", role.as_str()),
            conversation_id: "c".into(),
            role,
            content: content.into(),
            attachments: None,
            tokens: None,
            created_at: "2025-01-01T00:00:00Z".into(),
        }
    }

    fn block(name: &str, body: &str) -> TextBlock {
        TextBlock {
            name: name.into(),
            body: body.into(),
        }
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(
            enhance_user_content("hello", &ResolvedAttachments::default()),
            "hello"
        );
    }

    #[test]
    fn test_images_without_text_use_default_instruction() {
        let attachments = ResolvedAttachments {
            image_urls: vec!["https://img/1".into()],
            ..ResolvedAttachments::default()
        };
        assert_eq!(
            enhance_user_content("   ", &attachments),
            prompts::DEFAULT_IMAGE_INSTRUCTION
        );
    }

    #[test]
    fn test_files_without_text_get_analyze_prefix_and_ordered_blocks() {
        let attachments = ResolvedAttachments {
            text_blocks: vec![block("a.md", "# A"), block("b.txt", "bee")],
            ..ResolvedAttachments::default()
        };
        let enhanced = enhance_user_content("", &attachments);

        let expected = format!(
            "{}{}\n[File: a.md]\n```\n# A\n```\n\n[File: b.txt]\n```\nbee\n```\n",
            prompts::ANALYZE_FILES_INSTRUCTION,
            prompts::FILE_BLOCK_HEADER
        );
        assert_eq!(enhanced, expected);
    }

    #[test]
    fn test_files_with_text_are_appended() {
        let attachments = ResolvedAttachments {
            text_blocks: vec![block("notes.txt", "n")],
            ..ResolvedAttachments::default()
        };
        let enhanced = enhance_user_content("summarize", &attachments);
        assert!(enhanced.starts_with("summarize\n\n---\n"));
        assert!(enhanced.ends_with("[File: notes.txt]\n```\nn\n```\n"));
    }

    #[test]
    fn test_context_order_and_role_filter() {
        let history = vec![
            history_message(MessageRole::User, "q1"),
            history_message(MessageRole::System, "ignored"),
            history_message(MessageRole::Assistant, "a1"),
        ];
        let messages = build_context("sys", &history, "q2", &ResolvedAttachments::default());

        let rendered: Vec<_> = messages
            .iter()
            .map(|m| (m.role, m.content.text()))
            .collect();
        assert_eq!(
            rendered,
            vec![
                (MessageRole::System, "sys".to_owned()),
                (MessageRole::User, "q1".to_owned()),
                (MessageRole::Assistant, "a1".to_owned()),
                (MessageRole::User, "q2".to_owned()),
            ]
        );
    }

    #[test]
    fn test_images_make_final_message_multipart() {
        let attachments = ResolvedAttachments {
            image_urls: vec!["https://img/1".into(), "https://img/2".into()],
            ..ResolvedAttachments::default()
        };
        let messages = build_context("sys", &[], "", &attachments);
        let last = messages.last().unwrap();

        let MessageContent::Parts(parts) = &last.content else {
            panic!("expected multi-part content");
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[0], ContentPart::Text { text } if text == prompts::DEFAULT_IMAGE_INSTRUCTION));
        assert_eq!(last.content.image_urls(), vec!["https://img/1", "https://img/2"]);
    }
}
