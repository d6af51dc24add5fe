//! Decision Port 抽象
//!
//! 所有 Oracle 后端（OpenAI 兼容 / 规则 / 脚本）实现 DecisionPort：
//! 给定情境与可用动作声明，返回零或多个动作提案。输出不可信，由工具服务重新校验。

use async_trait::async_trait;

use crate::control::SituationalContext;
use crate::core::{ActionProposal, DecisionError};
use crate::tools::ActionSpec;

#[async_trait]
pub trait DecisionPort: Send + Sync {
    async fn decide(
        &self,
        context: &SituationalContext,
        available_actions: &[ActionSpec],
    ) -> Result<Vec<ActionProposal>, DecisionError>;

    /// 累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
