// ABOUTME: Shared server resources injected into every route handler
// ABOUTME: Holds configuration, the store, auth and the turn orchestrator
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::Arc;

use crate::auth::AuthManager;
use crate::config::ServerConfig;
use crate::database::ChatStore;
use crate::llm::LlmProvider;
use crate::middleware::AuthMiddleware;
use crate::services::chat_orchestration::ChatOrchestrator;
use crate::storage::ObjectStore;

/// Centralized resource container for dependency injection
///
/// Built once by the binary (or by tests with fakes) and shared by handlers
/// through `State<Arc<ServerResources>>`.
#[derive(Clone)]
pub struct ServerResources {
    /// Server configuration
    pub config: Arc<ServerConfig>,
    /// Conversation and message persistence
    pub store: Arc<dyn ChatStore>,
    /// Request authentication
    pub auth_middleware: AuthMiddleware,
    /// Chat turn driver owning the completion backend and attachment downloads
    pub orchestrator: ChatOrchestrator,
}

impl ServerResources {
    /// Assemble resources from their collaborators
    #[must_use]
    pub fn new(
        config: Arc<ServerConfig>,
        store: Arc<dyn ChatStore>,
        llm: Arc<dyn LlmProvider>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        let auth_middleware = AuthMiddleware::new(AuthManager::from_config(&config.auth));
        let orchestrator =
            ChatOrchestrator::new(Arc::clone(&store), llm, objects, config.turn.clone());
        Self {
            config,
            store,
            auth_middleware,
            orchestrator,
        }
    }

    /// Token manager, used by tooling and tests to issue tokens
    #[must_use]
    pub const fn auth_manager(&self) -> &AuthManager {
        self.auth_middleware.auth_manager()
    }
}
