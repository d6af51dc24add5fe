//! MCP 服务端（Streamable HTTP，仅 JSON 响应）
//!
//! POST /mcp 处理单条 JSON-RPC 消息；initialize 分配会话 ID（Mcp-Session-Id 响应头），
//! 之后的请求必须带上该头：缺失返回 400，未知返回 404。DELETE /mcp 结束会话。
//! 会话数有上限，超出时淘汰最久未活动的会话（崩溃重启的客户端不会发 DELETE）。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::mcp::protocol::{
    is_supported_version, CallToolParams, CallToolResult, Implementation, InitializeParams,
    InitializeResult, JsonRpcRequest, JsonRpcResponse, ToolDescriptor, INVALID_PARAMS,
    INVALID_REQUEST, LATEST_PROTOCOL_VERSION, METHOD_NOT_FOUND, PARSE_ERROR, SESSION_HEADER,
};
use crate::tools::ToolExecutor;

/// 默认会话上限
pub const DEFAULT_MAX_SESSIONS: usize = 64;

pub struct McpServer {
    executor: ToolExecutor,
    server_info: Implementation,
    /// 会话 ID → 最近一次活动时间
    sessions: RwLock<HashMap<String, Instant>>,
    max_sessions: usize,
}

impl McpServer {
    pub fn new(executor: ToolExecutor, server_info: Implementation) -> Self {
        Self {
            executor,
            server_info,
            sessions: RwLock::new(HashMap::new()),
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    pub async fn has_session(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// 会话存在时刷新活动时间
    async fn touch_session(&self, id: &str) -> bool {
        match self.sessions.write().await.get_mut(id) {
            Some(last_seen) => {
                *last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    async fn open_session(&self) -> String {
        let session_id = uuid::Uuid::new_v4().to_string();
        let mut sessions = self.sessions.write().await;
        while sessions.len() >= self.max_sessions {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, last_seen)| **last_seen)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            sessions.remove(&oldest);
            tracing::info!(session = %oldest, "Evicted idle MCP session");
        }
        sessions.insert(session_id.clone(), Instant::now());
        session_id
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// 握手：协商版本并分配会话；参数不合法时返回错误且不分配会话
    async fn initialize(&self, request: JsonRpcRequest) -> (Option<String>, JsonRpcResponse) {
        let id = request.id.clone().unwrap_or(Value::Null);
        let params: InitializeParams =
            match serde_json::from_value(request.params.unwrap_or(Value::Null)) {
                Ok(p) => p,
                Err(e) => {
                    return (
                        None,
                        JsonRpcResponse::error(id, INVALID_PARAMS, format!("invalid initialize params: {e}")),
                    )
                }
            };

        let protocol_version = if is_supported_version(&params.protocol_version) {
            params.protocol_version.clone()
        } else {
            LATEST_PROTOCOL_VERSION.to_string()
        };

        let session_id = self.open_session().await;
        tracing::info!(
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            protocol_version = %protocol_version,
            session = %session_id,
            "MCP session initialized"
        );

        let result = InitializeResult {
            protocol_version,
            capabilities: serde_json::json!({ "tools": { "listChanged": false } }),
            server_info: self.server_info.clone(),
        };
        let result = serde_json::to_value(&result).unwrap_or(Value::Null);
        (Some(session_id), JsonRpcResponse::success(id, result))
    }

    /// 会话内请求分发（pub 便于单元测试）
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone().unwrap_or(Value::Null);
        match request.method.as_str() {
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "tools/list" => {
                let tools: Vec<ToolDescriptor> = self
                    .executor
                    .specs()
                    .into_iter()
                    .map(ToolDescriptor::from)
                    .collect();
                JsonRpcResponse::success(id, serde_json::json!({ "tools": tools }))
            }
            "tools/call" => {
                let params: CallToolParams = match request.params.map(serde_json::from_value) {
                    Some(Ok(p)) => p,
                    Some(Err(e)) => {
                        return JsonRpcResponse::error(id, INVALID_PARAMS, format!("invalid params: {e}"))
                    }
                    None => return JsonRpcResponse::error(id, INVALID_PARAMS, "missing params"),
                };
                let result = match self.executor.execute(&params.name, params.arguments).await {
                    Ok(result) => CallToolResult::structured(
                        serde_json::to_value(&result).unwrap_or(Value::Null),
                        false,
                    ),
                    Err(e) => CallToolResult::structured(
                        serde_json::json!({ "kind": e.kind(), "message": e.to_string() }),
                        true,
                    ),
                };
                JsonRpcResponse::success(id, serde_json::to_value(&result).unwrap_or(Value::Null))
            }
            other => JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("method not found: {other}")),
        }
    }
}

pub fn router(server: Arc<McpServer>) -> Router {
    Router::new()
        .route("/mcp", post(handle_post).delete(handle_delete))
        .with_state(server)
}

/// 监听直到 shutdown 被取消
pub async fn serve(
    listener: tokio::net::TcpListener,
    server: Arc<McpServer>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router(server))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

fn rpc_error(status: StatusCode, code: i64, message: String) -> Response {
    (status, Json(JsonRpcResponse::error(Value::Null, code, message))).into_response()
}

async fn handle_post(
    State(server): State<Arc<McpServer>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let raw: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) => return rpc_error(StatusCode::BAD_REQUEST, PARSE_ERROR, format!("parse error: {e}")),
    };
    let request: JsonRpcRequest = match serde_json::from_value(raw) {
        Ok(r) => r,
        Err(e) => {
            return rpc_error(StatusCode::BAD_REQUEST, INVALID_REQUEST, format!("invalid request: {e}"))
        }
    };
    if request.jsonrpc != "2.0" {
        return rpc_error(
            StatusCode::BAD_REQUEST,
            INVALID_REQUEST,
            "invalid jsonrpc version".to_string(),
        );
    }

    if request.method == "initialize" {
        if request.is_notification() {
            return rpc_error(
                StatusCode::BAD_REQUEST,
                INVALID_REQUEST,
                "initialize must be a request with an id".to_string(),
            );
        }
        let (session_id, response) = server.initialize(request).await;
        let mut http = Json(response).into_response();
        if let Some(value) = session_id.and_then(|s| HeaderValue::from_str(&s).ok()) {
            http.headers_mut().insert(SESSION_HEADER, value);
        }
        return http;
    }

    let session = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok());
    match session {
        None => {
            return rpc_error(
                StatusCode::BAD_REQUEST,
                INVALID_REQUEST,
                "missing Mcp-Session-Id header".to_string(),
            )
        }
        Some(id) if !server.touch_session(id).await => {
            return rpc_error(StatusCode::NOT_FOUND, INVALID_REQUEST, format!("unknown session: {id}"))
        }
        Some(_) => {}
    }

    if request.is_notification() {
        return StatusCode::ACCEPTED.into_response();
    }

    Json(server.handle_request(request).await).into_response()
}

async fn handle_delete(State(server): State<Arc<McpServer>>, headers: HeaderMap) -> StatusCode {
    let Some(id) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) else {
        return StatusCode::BAD_REQUEST;
    };
    if server.sessions.write().await.remove(id).is_some() {
        tracing::info!(session = %id, "MCP session closed");
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ConfigStore;
    use crate::tools::{AdjustThresholdTool, ThresholdService, ToolRegistry};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn server(dir: &TempDir) -> Arc<McpServer> {
        let svc = Arc::new(ThresholdService::new(ConfigStore::new(dir.path().join("config.json"))));
        let mut registry = ToolRegistry::new();
        registry.register(AdjustThresholdTool::new(svc));
        Arc::new(McpServer::new(
            ToolExecutor::new(registry),
            Implementation {
                name: "test-server".into(),
                version: "0.0.1".into(),
            },
        ))
    }

    fn post(body: Value, session: Option<&str>) -> Request<Body> {
        let mut builder = Request::post("/mcp").header("content-type", "application/json");
        if let Some(s) = session {
            builder = builder.header(SESSION_HEADER, s);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn init_body(version: &str) -> Value {
        json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize",
            "params": {
                "protocolVersion": version,
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "0.0.1"}
            }
        })
    }

    async fn initialize(srv: &Arc<McpServer>) -> String {
        let resp = router(srv.clone())
            .oneshot(post(init_body(LATEST_PROTOCOL_VERSION), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        resp.headers()[SESSION_HEADER].to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_initialize_assigns_session_and_negotiates_version() {
        let dir = TempDir::new().unwrap();
        let srv = server(&dir);

        let resp = router(srv.clone())
            .oneshot(post(init_body("2024-11-05"), None))
            .await
            .unwrap();
        let session = resp.headers()[SESSION_HEADER].to_str().unwrap().to_string();
        let body = body_json(resp).await;
        assert_eq!(body["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(body["result"]["serverInfo"]["name"], "test-server");
        assert!(body["result"]["capabilities"]["tools"].is_object());
        assert!(srv.has_session(&session).await);

        let resp = router(srv.clone())
            .oneshot(post(init_body("1999-01-01"), None))
            .await
            .unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["result"]["protocolVersion"], LATEST_PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn test_initialize_with_bad_params_creates_no_session() {
        let dir = TempDir::new().unwrap();
        let srv = server(&dir);
        let resp = router(srv.clone())
            .oneshot(post(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}), None))
            .await
            .unwrap();
        assert!(resp.headers().get(SESSION_HEADER).is_none());
        let body = body_json(resp).await;
        assert_eq!(body["error"]["code"], INVALID_PARAMS);
        assert_eq!(srv.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_initialize_without_id_is_rejected() {
        let dir = TempDir::new().unwrap();
        let srv = server(&dir);
        let mut body = init_body(LATEST_PROTOCOL_VERSION);
        body.as_object_mut().unwrap().remove("id");

        let resp = router(srv.clone()).oneshot(post(body, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(resp.headers().get(SESSION_HEADER).is_none());
        assert_eq!(body_json(resp).await["error"]["code"], INVALID_REQUEST);
        assert_eq!(srv.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_session_limit_evicts_least_recently_used() {
        let dir = TempDir::new().unwrap();
        let svc = Arc::new(ThresholdService::new(ConfigStore::new(dir.path().join("config.json"))));
        let mut registry = ToolRegistry::new();
        registry.register(AdjustThresholdTool::new(svc));
        let srv = Arc::new(
            McpServer::new(
                ToolExecutor::new(registry),
                Implementation {
                    name: "test-server".into(),
                    version: "0.0.1".into(),
                },
            )
            .with_max_sessions(2),
        );

        let first = initialize(&srv).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = initialize(&srv).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        // first 有活动，second 变成最久未活动
        let ping = json!({"jsonrpc": "2.0", "id": 9, "method": "ping"});
        let resp = router(srv.clone()).oneshot(post(ping, Some(&first))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let third = initialize(&srv).await;
        assert_eq!(srv.session_count().await, 2);
        assert!(srv.has_session(&first).await);
        assert!(!srv.has_session(&second).await);
        assert!(srv.has_session(&third).await);
    }

    #[tokio::test]
    async fn test_session_required_for_steady_state_calls() {
        let dir = TempDir::new().unwrap();
        let srv = server(&dir);
        let list = json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"});

        let resp = router(srv.clone()).oneshot(post(list.clone(), None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = router(srv.clone())
            .oneshot(post(list, Some("not-a-session")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_notification_is_accepted() {
        let dir = TempDir::new().unwrap();
        let srv = server(&dir);
        let session = initialize(&srv).await;
        let resp = router(srv)
            .oneshot(post(
                json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
                Some(&session),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_tools_list_and_call() {
        let dir = TempDir::new().unwrap();
        let srv = server(&dir);
        let session = initialize(&srv).await;

        let resp = router(srv.clone())
            .oneshot(post(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}), Some(&session)))
            .await
            .unwrap();
        let body = body_json(resp).await;
        let tools = body["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "adjust_threshold");
        assert_eq!(tools[0]["inputSchema"]["properties"]["value"]["type"], "number");

        let call = json!({
            "jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": {"name": "adjust_threshold", "arguments": {"value": 90}}
        });
        let resp = router(srv.clone()).oneshot(post(call, Some(&session))).await.unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["id"], 3);
        assert_eq!(body["result"]["isError"], false);
        assert_eq!(
            body["result"]["structuredContent"],
            json!({"old_value": 80.0, "new_value": 90.0, "status": "success"})
        );
    }

    #[tokio::test]
    async fn test_tool_rejection_is_structured() {
        let dir = TempDir::new().unwrap();
        let srv = server(&dir);
        let session = initialize(&srv).await;

        let call = json!({
            "jsonrpc": "2.0", "id": 4, "method": "tools/call",
            "params": {"name": "adjust_threshold", "arguments": {"value": 250}}
        });
        let resp = router(srv.clone()).oneshot(post(call, Some(&session))).await.unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["result"]["isError"], true);
        assert_eq!(body["result"]["structuredContent"]["kind"], "out_of_range");
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let dir = TempDir::new().unwrap();
        let srv = server(&dir);
        let session = initialize(&srv).await;

        let resp = router(srv.clone())
            .oneshot(
                Request::post("/mcp")
                    .header(SESSION_HEADER, &session)
                    .body(Body::from("{oops"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"]["code"], PARSE_ERROR);

        let resp = router(srv.clone())
            .oneshot(post(json!({"jsonrpc": "1.0", "id": 1, "method": "ping"}), Some(&session)))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["error"]["code"], INVALID_REQUEST);

        let resp = router(srv.clone())
            .oneshot(post(json!({"jsonrpc": "2.0", "id": 5, "method": "resources/list"}), Some(&session)))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["error"]["code"], METHOD_NOT_FOUND);

        let resp = router(srv.clone())
            .oneshot(post(json!({"jsonrpc": "2.0", "id": 6, "method": "tools/call"}), Some(&session)))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_delete_closes_session() {
        let dir = TempDir::new().unwrap();
        let srv = server(&dir);
        let session = initialize(&srv).await;

        let delete = || {
            Request::delete("/mcp")
                .header(SESSION_HEADER, &session)
                .body(Body::empty())
                .unwrap()
        };
        let resp = router(srv.clone()).oneshot(delete()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(!srv.has_session(&session).await);

        let resp = router(srv.clone()).oneshot(delete()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
