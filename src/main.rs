#![deny(unused)]
//! codepod — sandboxed code execution service.
//!
//! Runs untrusted code snippets inside disposable, resource-bounded Docker
//! containers with per-session persistent state, alongside a web-fetch
//! collaborator, all exposed as tools over a JSON-lines stdin/stdout
//! protocol for an orchestrating agent.

mod dispatch;
mod registry;

use std::sync::Arc;

use codepod_core::config::AppConfig;
use codepod_core::traits::ToolRegistry;
use codepod_sandbox::{
    ClearStateTool, DockerEngine, ExecuteCodeTool, GetStateTool, ResourceLimits, SandboxEngine,
    SandboxSession, SetStateTool,
};
use codepod_web::{FindInPageTool, OpenPageTool, SearchTool, WebFetcher, WebFetcherConfig};

use crate::registry::DefaultToolRegistry;

/// Stdout carries the dispatch protocol, so logs go to stderr.
fn configure_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,codepod=debug".into()),
    );

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn limits_from_config(config: &AppConfig) -> ResourceLimits {
    let sandbox = &config.sandbox;
    ResourceLimits {
        timeout_secs: sandbox.timeout_secs,
        memory_limit: sandbox.memory_limit.clone(),
        cpu_share: sandbox.cpu_share,
        network_disabled: sandbox.network_disabled,
        filesystem_read_only: sandbox.filesystem_read_only,
        base_image: sandbox.base_image.clone(),
        max_output_bytes: sandbox.max_output_bytes,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    configure_tracing();

    tracing::info!("Starting codepod v{}", env!("CARGO_PKG_VERSION"));

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "Config load failed, using built-in defaults");
            AppConfig::default()
        }
    };

    let tools = Arc::new(DefaultToolRegistry::new());

    // =========================================================================
    // Sandbox execution core
    // =========================================================================
    let limits = limits_from_config(&config);
    limits.validate()?;

    match DockerEngine::new() {
        Ok(engine) => {
            let engine = Arc::new(engine);
            if engine.is_available().await {
                let session = Arc::new(SandboxSession::new(engine, limits));
                tracing::info!(session = %session.id(), "Sandbox session initialized");

                tools
                    .register(Box::new(ExecuteCodeTool::new(session.clone())))
                    .await?;
                tools
                    .register(Box::new(GetStateTool::new(session.clone())))
                    .await?;
                tools
                    .register(Box::new(SetStateTool::new(session.clone())))
                    .await?;
                tools
                    .register(Box::new(ClearStateTool::new(session)))
                    .await?;
            } else {
                tracing::warn!("Docker daemon not reachable — sandbox tools disabled");
            }
        }
        Err(e) => {
            tracing::warn!("Docker not available ({}). Sandbox tools disabled.", e);
        }
    }

    // =========================================================================
    // Web-fetch collaborator
    // =========================================================================
    let fetcher = Arc::new(WebFetcher::new(WebFetcherConfig {
        search_endpoint: config.web.search_endpoint.clone(),
        max_download_size_bytes: config.web.max_download_size_bytes,
        cache_capacity: config.web.cache_capacity,
    }));

    tools
        .register(Box::new(SearchTool::new(fetcher.clone())))
        .await?;
    tools
        .register(Box::new(OpenPageTool::new(fetcher.clone())))
        .await?;
    tools
        .register(Box::new(FindInPageTool::new(fetcher)))
        .await?;

    tracing::info!(tools_count = tools.len(), "Tool registry initialized");

    dispatch::serve(tools).await
}
