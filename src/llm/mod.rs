//! Oracle 层：DecisionPort 抽象与实现（OpenAI 兼容 / 规则 / 脚本）

pub mod mock;
pub mod openai;
pub mod traits;

use crate::config::LlmSection;

pub use mock::{RuleDecider, ScriptedDecider};
pub use openai::{OpenAiDecider, TokenUsage, DASHSCOPE_BASE_URL, QWEN_TURBO};
pub use traits::DecisionPort;

use std::sync::Arc;

/// 根据 [llm] 配置创建 Oracle；provider = "mock" 时不需要 API Key
pub fn create_decider_from_config(llm: &LlmSection) -> anyhow::Result<Arc<dyn DecisionPort>> {
    match llm.provider.as_str() {
        "mock" => {
            tracing::info!("Using rule-based mock oracle");
            Ok(Arc::new(RuleDecider))
        }
        "openai" => {
            let api_key = std::env::var(&llm.api_key_env)
                .ok()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("please set the {} environment variable", llm.api_key_env))?;
            tracing::info!(model = %llm.model, base_url = %llm.base_url, "Using OpenAI-compatible oracle");
            Ok(Arc::new(OpenAiDecider::new(
                Some(llm.base_url.as_str()),
                &llm.model,
                &api_key,
            )))
        }
        other => anyhow::bail!("unknown llm provider: {other} (expected openai or mock)"),
    }
}
