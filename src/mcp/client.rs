//! MCP 客户端
//!
//! McpClient::initialize 完成一次性握手（版本 + 调用方身份），得到 McpSession；
//! 会话在进程生命周期内复用，不自动重连。握手失败是致命的，会话内请求失败只返回错误。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;

use crate::core::{
    ActionResult, DispatchError, InitializationError, ToolErrorKind, TransportError,
};
use crate::mcp::protocol::{
    is_supported_version, CallToolResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcRequest, JsonRpcResponse, ToolDescriptor, LATEST_PROTOCOL_VERSION, SESSION_HEADER,
};
use crate::mcp::ToolTransport;
use crate::tools::ActionSpec;

const ACCEPT_BOTH: &str = "application/json, text/event-stream";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// 未握手的客户端
pub struct McpClient {
    http: reqwest::Client,
    endpoint: String,
    client_info: Implementation,
}

impl McpClient {
    pub fn new(endpoint: impl Into<String>, client_info: Implementation) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            endpoint: endpoint.into(),
            client_info,
        }
    }

    /// initialize → 校验协议版本 → notifications/initialized
    pub async fn initialize(self) -> Result<McpSession, InitializationError> {
        let params = InitializeParams {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: serde_json::json!({}),
            client_info: self.client_info.clone(),
        };
        let params = serde_json::to_value(&params)
            .map_err(|e| InitializationError::Handshake(e.to_string()))?;
        let request = JsonRpcRequest::new(0, "initialize", params);

        let response = self
            .http
            .post(&self.endpoint)
            .header(ACCEPT, ACCEPT_BOTH)
            .json(&request)
            .send()
            .await
            .map_err(|e| InitializationError::Unreachable(e.to_string()))?;
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let result = read_rpc_result(response).await?;
        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| InitializationError::Handshake(format!("invalid initialize result: {e}")))?;
        if !is_supported_version(&init.protocol_version) {
            return Err(InitializationError::UnsupportedVersion(init.protocol_version));
        }

        let session = McpSession {
            http: self.http,
            endpoint: self.endpoint,
            session_id,
            next_id: AtomicU64::new(1),
            server_info: init.server_info,
            protocol_version: init.protocol_version,
        };
        session.notify("notifications/initialized").await?;

        tracing::info!(
            server = %session.server_info.name,
            server_version = %session.server_info.version,
            protocol_version = %session.protocol_version,
            "MCP session established"
        );
        Ok(session)
    }
}

/// 已握手的会话
pub struct McpSession {
    http: reqwest::Client,
    endpoint: String,
    session_id: Option<String>,
    next_id: AtomicU64,
    server_info: Implementation,
    protocol_version: String,
}

impl McpSession {
    pub fn server_info(&self) -> &Implementation {
        &self.server_info
    }

    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn post(&self) -> reqwest::RequestBuilder {
        let builder = self.http.post(&self.endpoint).header(ACCEPT, ACCEPT_BOTH);
        match &self.session_id {
            Some(id) => builder.header(SESSION_HEADER, id),
            None => builder,
        }
    }

    pub async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let response = self.post().json(&request).send().await?;
        read_rpc_result(response).await
    }

    pub async fn notify(&self, method: &str) -> Result<(), TransportError> {
        let response = self
            .post()
            .json(&JsonRpcRequest::notification(method))
            .send()
            .await?;
        ensure_success(response).await.map(|_| ())
    }

    pub async fn list_tools(&self) -> Result<Vec<ActionSpec>, TransportError> {
        let result = self.request("tools/list", serde_json::json!({})).await?;
        let tools: Vec<ToolDescriptor> = serde_json::from_value(result["tools"].clone())
            .map_err(|e| TransportError::Malformed(format!("invalid tools/list result: {e}")))?;
        Ok(tools.into_iter().map(ActionSpec::from).collect())
    }

    /// tools/call；isError 的结果映射为 DispatchError::Rejected
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ActionResult, DispatchError> {
        let result = self
            .request(
                "tools/call",
                serde_json::json!({ "name": name, "arguments": arguments }),
            )
            .await?;
        let result: CallToolResult = serde_json::from_value(result)
            .map_err(|e| TransportError::Malformed(format!("invalid tools/call result: {e}")))?;

        if result.is_error {
            let payload = result.payload().unwrap_or(Value::Null);
            let kind = payload
                .get("kind")
                .cloned()
                .and_then(|k| serde_json::from_value::<ToolErrorKind>(k).ok());
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| result.text());
            return Err(DispatchError::Rejected { kind, message });
        }

        let payload = result
            .payload()
            .ok_or_else(|| TransportError::Malformed("tools/call result has no JSON payload".into()))?;
        serde_json::from_value(payload)
            .map_err(|e| TransportError::Malformed(format!("invalid action result: {e}")).into())
    }

    /// 结束会话（DELETE）
    pub async fn close(&self) -> Result<(), TransportError> {
        let Some(id) = &self.session_id else {
            return Ok(());
        };
        let response = self
            .http
            .delete(&self.endpoint)
            .header(SESSION_HEADER, id)
            .send()
            .await?;
        ensure_success(response).await.map(|_| ())
    }
}

#[async_trait]
impl ToolTransport for McpSession {
    async fn call(&self, operation: &str, arguments: Value) -> Result<ActionResult, DispatchError> {
        self.call_tool(operation, arguments).await
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

/// 读取 JSON-RPC 响应：支持 application/json，或 text/event-stream 中的第一条 data 事件
async fn read_rpc_result(response: reqwest::Response) -> Result<Value, TransportError> {
    let response = ensure_success(response).await?;
    let is_sse = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream"));
    let body = response.text().await?;

    let rpc: JsonRpcResponse = if is_sse {
        parse_sse_response(&body)?
    } else {
        serde_json::from_str(&body).map_err(|e| TransportError::Malformed(e.to_string()))?
    };

    if let Some(err) = rpc.error {
        return Err(TransportError::Rpc {
            code: err.code,
            message: err.message,
        });
    }
    rpc.result
        .ok_or_else(|| TransportError::Malformed("response has neither result nor error".into()))
}

fn parse_sse_response(body: &str) -> Result<JsonRpcResponse, TransportError> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .find_map(|data| serde_json::from_str::<JsonRpcResponse>(data.trim()).ok())
        .ok_or_else(|| TransportError::Malformed("no JSON-RPC response in event stream".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_response() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"ok\":true}}\n\n";
        let rpc = parse_sse_response(body).unwrap();
        assert_eq!(rpc.result.unwrap()["ok"], true);

        assert!(matches!(
            parse_sse_response("event: ping\n\n"),
            Err(TransportError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_initialize_unreachable_is_fatal_error() {
        // 端口 9 (discard) 通常没有监听
        let client = McpClient::new(
            "http://127.0.0.1:9/mcp",
            Implementation {
                name: "t".into(),
                version: "0".into(),
            },
        );
        let err = client.initialize().await.err().unwrap();
        assert!(matches!(err, InitializationError::Unreachable(_)));
    }
}
