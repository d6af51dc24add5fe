//! OpenAI 兼容 Oracle
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url，默认阿里百炼 DashScope）。
//! 动作以 function tool 声明，tool_choice = auto；请求/响应使用自带类型（byot），
//! 只取本项目需要的字段，兼容各家返回的细微差异。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::Client;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::control::SituationalContext;
use crate::core::{ActionProposal, DecisionError};
use crate::llm::DecisionPort;
use crate::tools::ActionSpec;

/// 阿里百炼 OpenAI 兼容地址
pub const DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const QWEN_TURBO: &str = "qwen-turbo";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    tools: Vec<ToolDefinition>,
    tool_choice: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ToolDefinition {
    r#type: &'static str,
    function: FunctionDefinition,
}

#[derive(Debug, Serialize)]
struct FunctionDefinition {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// OpenAI 兼容 Oracle：持有 Client 与 model 名
pub struct OpenAiDecider {
    client: Client<OpenAIConfig>,
    model: String,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiDecider {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            usage: TokenUsage::new(),
        }
    }

    fn build_request(&self, context: &SituationalContext, actions: &[ActionSpec]) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: context.render_prompt(),
            }],
            tools: actions
                .iter()
                .map(|a| ToolDefinition {
                    r#type: "function",
                    function: FunctionDefinition {
                        name: a.name.clone(),
                        description: a.description.clone(),
                        parameters: a.parameters.clone(),
                    },
                })
                .collect(),
            tool_choice: "auto",
        }
    }
}

#[async_trait]
impl DecisionPort for OpenAiDecider {
    async fn decide(
        &self,
        context: &SituationalContext,
        available_actions: &[ActionSpec],
    ) -> Result<Vec<ActionProposal>, DecisionError> {
        let request = self.build_request(context, available_actions);
        let response: ChatResponse = self
            .client
            .chat()
            .create_byot(request)
            .await
            .map_err(|e| match e {
                OpenAIError::JSONDeserialize(..) => DecisionError::Malformed(e.to_string()),
                other => DecisionError::Unreachable(other.to_string()),
            })?;

        if let Some(usage) = &response.usage {
            self.usage.add(usage.prompt_tokens, usage.completion_tokens);
        }
        proposals_from_response(response)
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}

/// 每个 tool call 成为一个提案；参数不是 JSON 对象的 tool call 记录后跳过
fn proposals_from_response(response: ChatResponse) -> Result<Vec<ActionProposal>, DecisionError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| DecisionError::Malformed("reply has no choices".to_string()))?;

    if let Some(text) = message.content.as_deref().filter(|t| !t.trim().is_empty()) {
        tracing::debug!(reply = %text, "Oracle text reply");
    }

    let mut proposals = Vec::new();
    for call in message.tool_calls.unwrap_or_default() {
        match serde_json::from_str::<Value>(&call.function.arguments) {
            Ok(args @ Value::Object(_)) => {
                proposals.push(ActionProposal::new(call.function.name, args))
            }
            Ok(other) => tracing::warn!(
                tool = %call.function.name,
                arguments = %other,
                "Tool call arguments are not an object, skipping"
            ),
            Err(e) => tracing::warn!(
                tool = %call.function.name,
                arguments = %call.function.arguments,
                error = %e,
                "Failed to parse tool call arguments, skipping"
            ),
        }
    }
    Ok(proposals)
}
