//! 工具服务入口：在 [mcp].bind 上以 Streamable HTTP 暴露 adjust_threshold

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use autotune::config::load_config;
use autotune::core::ShutdownManager;
use autotune::mcp::{serve, Implementation, McpServer};
use autotune::tools::{AdjustThresholdTool, ThresholdService, ToolExecutor, ToolRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    autotune::observability::init();

    let config_path = std::env::args().nth(1).map(Into::into);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let service = Arc::new(ThresholdService::with_lock_timeout(
        cfg.store.open(),
        Duration::from_secs(cfg.mcp.lock_timeout_secs.max(1)),
    ));
    let current = service.current().await;
    tracing::info!(
        path = %service.store().path().display(),
        "Current CPU alert threshold: {}",
        current
    );

    let mut registry = ToolRegistry::new();
    registry.register(AdjustThresholdTool::new(service));
    let executor = ToolExecutor::new(registry);

    let server = Arc::new(McpServer::new(
        executor,
        Implementation {
            name: cfg.mcp.server_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    ));

    let listener = tokio::net::TcpListener::bind(&cfg.mcp.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.mcp.bind))?;
    tracing::info!("MCP Server listening on {}/mcp", cfg.mcp.bind);

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();
    serve(listener, server, shutdown.token())
        .await
        .context("MCP server failed")?;

    tracing::info!(
        reason = shutdown.reason().map(|r| r.as_str()).unwrap_or("unknown"),
        "MCP Server stopped"
    );
    Ok(())
}
