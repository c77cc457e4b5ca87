// ABOUTME: Server-Sent Events encoding for streamed chat turns
// ABOUTME: Exposes the closed set of turn events and their wire form
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Chat-turn event types and SSE encoding
pub mod turn_events;

pub use turn_events::TurnEvent;
