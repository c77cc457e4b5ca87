// ABOUTME: Server binary wiring configuration, storage, the completion backend and HTTP routes
// ABOUTME: Loads environment configuration, initializes logging and serves until shutdown
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # chatstream server binary
//!
//! Starts the chat API with `SQLite` persistence and an Azure `OpenAI`
//! (or `OpenAI`-compatible) completion backend.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use chatstream::{
    config::ServerConfig,
    database::SqliteChatStore,
    llm::{AzureOpenAiConfig, AzureOpenAiProvider, LlmProvider},
    logging,
    resources::ServerResources,
    server,
    storage::HttpObjectStore,
};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "chatstream-server")]
#[command(about = "Streaming chat backend with persisted conversations")]
pub struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }

    logging::init_from_env()?;
    info!("Starting chatstream server");
    info!("{}", config.summary());

    let store = SqliteChatStore::connect(&config.database.url, config.llm.model.clone()).await?;
    info!("Database ready");

    let provider = AzureOpenAiProvider::new(AzureOpenAiConfig::from(&config.llm))?;
    match provider.health_check().await {
        Ok(true) => info!(provider = provider.name(), "Completion backend reachable"),
        Ok(false) => warn!(provider = provider.name(), "Completion backend unavailable"),
        Err(e) => warn!(error = %e, "Completion backend health check failed"),
    }

    let objects = HttpObjectStore::new(Duration::from_secs(config.storage.fetch_timeout_secs))?;

    let port = config.http_port;
    let resources = Arc::new(ServerResources::new(
        Arc::new(config),
        Arc::new(store),
        Arc::new(provider),
        Arc::new(objects),
    ));

    info!("Serving on port {port}");
    if let Err(e) = server::serve(resources, port).await {
        error!("Server error: {e}");
        return Err(e);
    }

    Ok(())
}
