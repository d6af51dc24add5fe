//! 决策循环入口
//!
//! 初始化日志与配置，创建 Oracle，与工具服务握手，然后按周期运行直到收到 Ctrl+C / SIGTERM。

use std::sync::Arc;

use anyhow::Context;
use autotune::config::load_config;
use autotune::control::{DecisionLoop, LoopSettings, StubMetrics};
use autotune::core::ShutdownManager;
use autotune::llm::create_decider_from_config;
use autotune::mcp::{Implementation, McpClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    autotune::observability::init();

    let config_path = std::env::args().nth(1).map(Into::into);
    let cfg = load_config(config_path).context("Failed to load config")?;

    // 缺少 API Key 等配置错误直接退出，不进入循环
    let decider = create_decider_from_config(&cfg.llm).context("Failed to create oracle")?;

    let client = McpClient::new(
        cfg.mcp.endpoint.clone(),
        Implementation {
            name: cfg.agent.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    );
    let session = Arc::new(
        client
            .initialize()
            .await
            .with_context(|| format!("Failed to connect to tool service at {}", cfg.mcp.endpoint))?,
    );

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let decision_loop = DecisionLoop::new(
        Arc::new(StubMetrics),
        decider,
        session.clone(),
        LoopSettings::from(&cfg.agent),
    );
    tracing::info!(
        interval_secs = cfg.agent.interval_secs,
        "Agent started, monitoring every {}s",
        cfg.agent.interval_secs
    );
    decision_loop.run(shutdown.token()).await;
    tracing::info!(
        reason = shutdown.reason().map(|r| r.as_str()).unwrap_or("unknown"),
        "Agent shutting down"
    );

    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "Failed to close tool service session");
    }
    Ok(())
}
