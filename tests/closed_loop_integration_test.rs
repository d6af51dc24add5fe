//! 闭环集成测试：真实 HTTP 工具服务 + MCP 会话 + 决策循环

use std::collections::HashMap;
use std::sync::Arc;

use autotune::control::{DecisionLoop, DispatchOutcome, FixedMetrics, LoopSettings, TickOutcome};
use autotune::core::{ActionProposal, ActionStatus, DispatchError, ToolErrorKind};
use autotune::llm::{RuleDecider, ScriptedDecider};
use autotune::mcp::{serve, Implementation, McpClient, McpServer, McpSession, SESSION_HEADER};
use autotune::store::ConfigStore;
use autotune::tools::{
    AdjustThresholdTool, ThresholdService, ToolExecutor, ToolRegistry, ADJUST_THRESHOLD,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

struct Harness {
    _dir: TempDir,
    store: ConfigStore,
    endpoint: String,
    shutdown: CancellationToken,
}

impl Harness {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        let service = Arc::new(ThresholdService::new(store.clone()));
        let mut registry = ToolRegistry::new();
        registry.register(AdjustThresholdTool::new(service));
        let server = Arc::new(McpServer::new(
            ToolExecutor::new(registry),
            Implementation {
                name: "auto-config-agent".into(),
                version: "test".into(),
            },
        ));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/mcp", listener.local_addr().unwrap());
        let shutdown = CancellationToken::new();
        tokio::spawn(serve(listener, server, shutdown.clone()));

        Self {
            _dir: dir,
            store,
            endpoint,
            shutdown,
        }
    }

    async fn session(&self) -> McpSession {
        McpClient::new(
            self.endpoint.clone(),
            Implementation {
                name: "auto-decision-agent".into(),
                version: "test".into(),
            },
        )
        .initialize()
        .await
        .unwrap()
    }

    fn persisted(&self) -> f64 {
        let raw = std::fs::read_to_string(self.store.path()).unwrap();
        let v: Value = serde_json::from_str(&raw).unwrap();
        v["cpu_alert_threshold"].as_f64().unwrap()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn settings() -> LoopSettings {
    LoopSettings {
        interval: Duration::from_millis(20),
        decide_timeout: Duration::from_secs(2),
        call_timeout: Duration::from_secs(2),
    }
}

#[tokio::test]
async fn test_high_cpu_raises_threshold_end_to_end() {
    let h = Harness::start().await;
    let session = Arc::new(h.session().await);
    assert_eq!(session.server_info().name, "auto-config-agent");

    let mut dl = DecisionLoop::new(
        Arc::new(FixedMetrics::cpu(90.0)),
        Arc::new(RuleDecider),
        session.clone(),
        settings(),
    );

    let TickOutcome::Dispatched(outcomes) = dl.tick().await else {
        panic!("expected a dispatch");
    };
    match &outcomes[..] {
        [DispatchOutcome::Applied { result, .. }] => {
            assert_eq!(result.old_value, 80.0);
            assert_eq!(result.new_value, 90.0);
            assert_eq!(result.status, ActionStatus::Success);
        }
        other => panic!("unexpected outcomes: {other:?}"),
    }
    assert_eq!(h.persisted(), 90.0);

    // 第二轮：旧值来自上一次写入
    let TickOutcome::Dispatched(outcomes) = dl.tick().await else {
        panic!("expected a dispatch");
    };
    assert!(matches!(&outcomes[0], DispatchOutcome::Applied { result, .. } if result.old_value == 90.0));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_low_cpu_leaves_store_untouched() {
    let h = Harness::start().await;
    let session = Arc::new(h.session().await);
    let mut dl = DecisionLoop::new(
        Arc::new(FixedMetrics::cpu(40.0)),
        Arc::new(RuleDecider),
        session,
        settings(),
    );

    assert!(matches!(dl.tick().await, TickOutcome::Dispatched(o) if o.is_empty()));
    // 服务端启动时没有读过文件，也没有写入
    assert!(!h.store.path().exists());
}

#[tokio::test]
async fn test_rejections_carry_kind_and_keep_value() {
    let h = Harness::start().await;
    let session = Arc::new(h.session().await);
    let decider = ScriptedDecider::new([Ok(vec![
        ActionProposal::new(ADJUST_THRESHOLD, json!({ "value": 150 })),
        ActionProposal::new(ADJUST_THRESHOLD, json!({ "value": "high" })),
        ActionProposal::new(ADJUST_THRESHOLD, json!({ "value": 72.5 })),
    ])]);
    let mut dl = DecisionLoop::new(
        Arc::new(FixedMetrics::cpu(90.0)),
        Arc::new(decider),
        session.clone(),
        settings(),
    );

    let TickOutcome::Dispatched(outcomes) = dl.tick().await else {
        panic!("expected a dispatch");
    };
    let kinds: Vec<&str> = outcomes
        .iter()
        .map(|o| match o {
            DispatchOutcome::Applied { .. } => "applied",
            DispatchOutcome::Failed { error, .. } => error.kind(),
            DispatchOutcome::Dropped { .. } => "dropped",
        })
        .collect();
    assert_eq!(kinds, vec!["out_of_range", "invalid_argument", "applied"]);
    assert_eq!(h.persisted(), 72.5);

    let err = session
        .call_tool("restart_service", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Rejected {
            kind: Some(ToolErrorKind::UnknownTool),
            ..
        }
    ));
    assert_eq!(h.persisted(), 72.5);
}

#[tokio::test]
async fn test_tools_list_advertises_bounds() {
    let h = Harness::start().await;
    let session = h.session().await;
    let tools = session.list_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, ADJUST_THRESHOLD);
    let value = &tools[0].parameters["properties"]["value"];
    assert_eq!(value["minimum"].as_f64(), Some(0.0));
    assert_eq!(value["maximum"].as_f64(), Some(100.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_form_a_chain() {
    let h = Harness::start().await;
    let session = Arc::new(h.session().await);

    let values: Vec<f64> = (0..12).map(|i| 10.0 + i as f64 * 5.5).collect();
    let mut handles = Vec::new();
    for v in values.clone() {
        let session = session.clone();
        handles.push(tokio::spawn(async move {
            session
                .call_tool(ADJUST_THRESHOLD, json!({ "value": v }))
                .await
                .unwrap()
        }));
    }
    let mut next: HashMap<u64, f64> = HashMap::new();
    for handle in handles {
        let r = handle.await.unwrap();
        assert!(next.insert(r.old_value.to_bits(), r.new_value).is_none());
    }

    // 从默认值出发，每次调用的旧值恰好是前一次调用的新值
    let mut cursor = 80.0_f64;
    let mut seen = 0;
    while let Some(n) = next.get(&cursor.to_bits()) {
        cursor = *n;
        seen += 1;
    }
    assert_eq!(seen, values.len());
    assert_eq!(h.persisted(), cursor);
}

#[tokio::test]
async fn test_session_header_is_enforced() {
    let h = Harness::start().await;
    let _session = h.session().await;
    let http = reqwest::Client::new();
    let body = json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" });

    let missing = http.post(&h.endpoint).json(&body).send().await.unwrap();
    assert_eq!(missing.status().as_u16(), 400);

    let unknown = http
        .post(&h.endpoint)
        .header(SESSION_HEADER, "not-a-session")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status().as_u16(), 404);
}

#[tokio::test]
async fn test_closed_session_is_forgotten() {
    let h = Harness::start().await;
    let session = h.session().await;
    session.close().await.unwrap();

    let err = session.list_tools().await.unwrap_err();
    assert!(err.to_string().contains("404"), "{err}");
}

#[tokio::test]
async fn test_unsupported_server_version_is_fatal() {
    use autotune::core::InitializationError;
    use axum::routing::post;

    let app = axum::Router::new().route(
        "/mcp",
        post(|| async {
            axum::Json(json!({
                "jsonrpc": "2.0",
                "id": 0,
                "result": {
                    "protocolVersion": "1999-01-01",
                    "capabilities": {},
                    "serverInfo": {"name": "legacy", "version": "0.1"}
                }
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}/mcp", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, app).await });

    let err = McpClient::new(
        endpoint,
        Implementation {
            name: "auto-decision-agent".into(),
            version: "test".into(),
        },
    )
    .initialize()
    .await
    .err()
    .unwrap();
    assert!(matches!(err, InitializationError::UnsupportedVersion(v) if v == "1999-01-01"));
}
