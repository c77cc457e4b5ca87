// ABOUTME: Domain service layer for chat turns, extracted from route handlers
// ABOUTME: Attachment resolution, prompt assembly, title generation and turn orchestration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Domain service layer
//!
//! Transport-agnostic business logic. The streaming and buffered HTTP
//! handlers both go through [`chat_orchestration::ChatOrchestrator`].

/// Attachment classification and download
pub mod attachments;

/// Chat turn state machine shared by the streaming and buffered paths
pub mod chat_orchestration;

/// Prompt assembly from system prompt, history and the current turn
pub mod context_builder;

/// Best-effort conversation titles
pub mod title;
