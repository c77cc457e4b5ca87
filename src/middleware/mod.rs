// ABOUTME: HTTP middleware for bearer authentication and cross-origin access
// ABOUTME: Re-exports the request authenticator and the CORS layer builder
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

pub mod auth;
pub mod cors;

// Authentication middleware
pub use auth::{AuthMiddleware, AuthUser};

// CORS configuration
pub use cors::setup_cors;
