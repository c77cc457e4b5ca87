// ABOUTME: Route module organization for the chat server HTTP endpoints
// ABOUTME: Groups conversation, message and health routes by domain
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Route modules
//!
//! Each domain module holds route definitions and thin handlers that
//! delegate to the store or the turn orchestrator.

/// Conversation and message routes
pub mod chat;
/// Health check and readiness routes
pub mod health;

pub use chat::ChatRoutes;
pub use health::HealthRoutes;
