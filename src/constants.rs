// ABOUTME: Fixed limits, completion parameters, default prompts and conversation defaults
// ABOUTME: Values shared by the turn orchestrator, title generator and HTTP validation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Constants
//!
//! Values here are part of observable behavior (prompt text, truncation
//! lengths, window sizes). Tunables that operators change per deployment live
//! in [`crate::config`] instead.

/// Service identity used in logs
pub mod service_names {
    /// Name reported at startup and in structured logs
    pub const CHATSTREAM_SERVER: &str = "chatstream-server";
    /// Name used in errors raised by the completion client
    pub const COMPLETION_BACKEND: &str = "Azure OpenAI";
    /// Name used in errors raised by the object store client
    pub const OBJECT_STORE: &str = "Object storage";
}

/// Input limits and window sizes
pub mod limits {
    /// Number of prior messages included in a turn's context
    pub const HISTORY_WINDOW: u32 = 20;
    /// Maximum characters in a single user message
    pub const MAX_MESSAGE_CHARS: usize = 32_000;
    /// Maximum characters in a conversation title
    pub const MAX_TITLE_CHARS: usize = 200;
    /// Maximum characters in a conversation system prompt
    pub const MAX_SYSTEM_PROMPT_CHARS: usize = 4_000;
    /// Maximum attachments on one message
    pub const MAX_ATTACHMENTS: usize = 10;
    /// Default page size when listing messages
    pub const DEFAULT_MESSAGE_PAGE: u32 = 50;
    /// Largest page size accepted when listing messages
    pub const MAX_MESSAGE_PAGE: u32 = 200;
    /// Default page size when listing conversations
    pub const DEFAULT_CONVERSATION_PAGE: u32 = 20;
    /// Largest page size accepted when listing conversations
    pub const MAX_CONVERSATION_PAGE: u32 = 100;
}

/// Completion parameters
pub mod completion {
    /// Output token cap for a normal turn
    pub const DEFAULT_MAX_TOKENS: u32 = 4_096;
    /// Sampling temperature for a normal turn
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;
    /// Output token cap for title generation
    pub const TITLE_MAX_TOKENS: u32 = 50;
    /// Sampling temperature for title generation
    pub const TITLE_TEMPERATURE: f32 = 0.3;
    /// Characters of first-turn content sent to the title model
    pub const TITLE_INPUT_CHARS: usize = 500;
    /// Characters kept from the generated title
    pub const TITLE_MAX_CHARS: usize = 20;
    /// Detail level requested for image parts
    pub const IMAGE_DETAIL: &str = "auto";
}

/// Fixed prompt text
pub mod prompts {
    /// User text substituted when a turn carries images but no text
    pub const DEFAULT_IMAGE_INSTRUCTION: &str =
        "Please describe and analyze the content of this image.";
    /// Prefix used when a turn carries text files but no text
    pub const ANALYZE_FILES_INSTRUCTION: &str = "Please analyze the following file content:";
    /// Header opening the block of inlined file contents
    pub const FILE_BLOCK_HEADER: &str =
        "\n\n---\nThe following is the content of files uploaded by the user:\n";
    /// Name shown for a text attachment without a filename
    pub const UNNAMED_FILE: &str = "uploaded_file";
    /// System prompt for the title model
    pub const TITLE_SYSTEM_PROMPT: &str = "You generate short titles for chat conversations. \
Given the user's first message, reply with a concise title of 5 to 15 words that captures the topic. \
Reply with the title only, without quotes or punctuation.";
    /// Title seed when the first turn only carried images
    pub const IMAGE_TITLE_SEED: &str = "Image analysis";
    /// Title seed prefix when the first turn only carried text files
    pub const FILE_TITLE_SEED_PREFIX: &str = "File analysis: ";
}

/// Conversation defaults
pub mod defaults {
    /// Title assigned to new conversations and used as the title fallback
    pub const CONVERSATION_TITLE: &str = "New conversation";
    /// System prompt assigned to new conversations
    pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";
    /// Model identifier assigned to new conversations
    pub const MODEL: &str = "gpt-4o";
}
