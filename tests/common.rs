// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides test logging, in-memory stores, configuration and server resources
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]
//! Shared test utilities for `chatstream`

use std::sync::{Arc, Once};
use std::time::Duration;

use anyhow::Result;
use chatstream::{
    config::{
        AuthConfig, CorsConfig, DatabaseConfig, Environment, LlmConfig, ServerConfig,
        StorageConfig, TurnConfig,
    },
    database::{ChatStore, SqliteChatStore},
    llm::LlmProvider,
    models::{Conversation, NewConversation},
    resources::ServerResources,
    storage::ObjectStore,
};

static INIT_LOGGER: Once = Once::new();

/// Secret used to sign tokens in tests
pub const TEST_JWT_SECRET: &str = "integration-test-secret-0123456789";

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        // Another test binary may already own the global subscriber
        let _ = tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .try_init();
    });
}

/// Fresh in-memory store with the schema in place
pub async fn create_test_store() -> Result<Arc<SqliteChatStore>> {
    init_test_logging();
    let store = SqliteChatStore::connect("sqlite::memory:", "gpt-4o").await?;
    Ok(Arc::new(store))
}

/// Turn settings with short timeouts suitable for tests
pub fn test_turn_config() -> TurnConfig {
    TurnConfig {
        turn_timeout: Duration::from_secs(5),
        idle_timeout: Duration::from_secs(2),
        ..TurnConfig::default()
    }
}

/// Server configuration that never touches the network
pub fn test_server_config(turn: TurnConfig) -> ServerConfig {
    ServerConfig {
        http_port: 0,
        environment: Environment::Testing,
        database: DatabaseConfig {
            url: "sqlite::memory:".to_owned(),
        },
        llm: LlmConfig {
            endpoint: "http://127.0.0.1:9".to_owned(),
            api_key: "test-key".to_owned(),
            deployment: None,
            api_version: "2024-08-06".to_owned(),
            model: "gpt-4o".to_owned(),
            max_tokens: turn.max_tokens,
            temperature: turn.temperature,
            connect_timeout_secs: 1,
        },
        auth: AuthConfig {
            jwt_secret: TEST_JWT_SECRET.to_owned(),
            jwt_expiry_hours: 1,
        },
        cors: CorsConfig::default(),
        storage: StorageConfig {
            fetch_timeout_secs: 1,
        },
        turn,
    }
}

/// Server resources over an in-memory store and the given fakes
pub async fn create_test_server_resources(
    llm: Arc<dyn LlmProvider>,
    objects: Arc<dyn ObjectStore>,
    turn: TurnConfig,
) -> Result<(Arc<ServerResources>, Arc<SqliteChatStore>)> {
    let store = create_test_store().await?;
    let resources = ServerResources::new(
        Arc::new(test_server_config(turn)),
        Arc::clone(&store) as Arc<dyn ChatStore>,
        llm,
        objects,
    );
    Ok((Arc::new(resources), store))
}

/// Create a conversation with default settings for `user_id`
pub async fn create_test_conversation(
    store: &dyn ChatStore,
    user_id: &str,
) -> Result<Conversation> {
    Ok(store
        .create_conversation(user_id, NewConversation::default())
        .await?)
}
