// ABOUTME: Main library entry point for the chatstream conversation backend
// ABOUTME: Streams chat completions to clients over SSE and persists every turn
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # chatstream
//!
//! Backend for multi-turn chat with a hosted completion model. A user sends
//! text plus optional image or text-file attachments to a conversation; the
//! server assembles the prompt from the conversation's system prompt and
//! recent history, relays the model's reply to the client token by token
//! as Server-Sent Events, and persists both messages once the reply is
//! complete. The first turn of a conversation also gets a short generated
//! title.
//!
//! ## Architecture
//!
//! - **`services`**: attachment resolution, prompt assembly, title
//!   generation and the turn state machine
//! - **`llm`**: completion backend abstraction and the Azure `OpenAI`
//!   (or `OpenAI`-compatible) streaming client
//! - **`database`**: conversation and message persistence
//! - **`storage`**: attachment downloads
//! - **`routes`**: HTTP handlers; **`sse`**: the turn event protocol
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use chatstream::config::ServerConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("{}", config.summary());
//!     Ok(())
//! }
//! ```

/// JWT issuing and validation
pub mod auth;

/// Environment-driven configuration
pub mod config;

/// Application constants
pub mod constants;

/// Conversation and message persistence
pub mod database;

/// Unified error type and HTTP mapping
pub mod errors;

/// Completion backend abstraction and providers
pub mod llm;

/// Structured logging setup
pub mod logging;

/// HTTP middleware
pub mod middleware;

/// Domain data types
pub mod models;

/// Shared server resources
pub mod resources;

/// HTTP route handlers
pub mod routes;

/// Router assembly and serving
pub mod server;

/// Chat domain services
pub mod services;

/// Turn event protocol over Server-Sent Events
pub mod sse;

/// Attachment object storage
pub mod storage;
