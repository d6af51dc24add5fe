//! Autotune - 闭环配置智能体
//!
//! 决策循环周期性采样指标，交给 Oracle（LLM）判断是否需要调整；Oracle 提出的
//! `adjust_threshold` 调用经 MCP 发给工具服务，由工具服务校验并原子化写入 config.json。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **control**: 指标采样、情境快照、决策主循环
//! - **core**: 领域类型、错误分类、循环阶段、优雅关闭
//! - **llm**: Oracle 抽象与实现（OpenAI 兼容 / 规则 / 脚本）
//! - **mcp**: MCP 协议类型、Streamable HTTP 服务端与客户端
//! - **observability**: 日志初始化
//! - **store**: 阈值文件的读取与原子写入
//! - **tools**: 工具注册、执行器与阈值服务

pub mod config;
pub mod control;
pub mod core;
pub mod llm;
pub mod mcp;
pub mod observability;
pub mod store;
pub mod tools;
