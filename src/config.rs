//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `AUTOTUNE__*` 覆盖（双下划线表示嵌套，如 `AUTOTUNE__LLM__PROVIDER=mock`）。
//! Oracle 的 API Key 不放在配置文件里，只从 `llm.api_key_env` 指定的环境变量读取。

use std::path::PathBuf;

use serde::Deserialize;

use crate::llm::{DASHSCOPE_BASE_URL, QWEN_TURBO};
use crate::store::{ConfigStore, CONFIG_FILE_NAME};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub llm: LlmSection,
    pub mcp: McpSection,
    pub store: StoreSection,
}

/// [agent] 段：决策循环身份、周期与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 握手时上报的调用方名称
    pub name: String,
    /// 轮询周期（秒）
    pub interval_secs: u64,
    /// 单次 Oracle 调用超时（秒）
    pub decide_timeout_secs: u64,
    /// 单次工具调用超时（秒）
    pub call_timeout_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: "auto-decision-agent".to_string(),
            interval_secs: 5,
            decide_timeout_secs: 60,
            call_timeout_secs: 15,
        }
    }
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai（任意 OpenAI 兼容端点）/ mock（本地规则）
    pub provider: String,
    pub model: String,
    pub base_url: String,
    /// 存放 API Key 的环境变量名
    pub api_key_env: String,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: QWEN_TURBO.to_string(),
            base_url: DASHSCOPE_BASE_URL.to_string(),
            api_key_env: "LLM_API_KEY".to_string(),
        }
    }
}

/// [mcp] 段：客户端连接地址与服务端监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct McpSection {
    pub endpoint: String,
    pub bind: String,
    pub server_name: String,
    /// 服务端等待阈值锁的上限（秒）；进入临界区后的写入不受此限制
    pub lock_timeout_secs: u64,
}

impl Default for McpSection {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9001/mcp".to_string(),
            bind: "0.0.0.0:9001".to_string(),
            server_name: "auto-config-agent".to_string(),
            lock_timeout_secs: 30,
        }
    }
}

/// [store] 段：阈值文件位置；dir 未设置时用可执行文件所在目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub dir: Option<PathBuf>,
    pub file_name: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            dir: None,
            file_name: CONFIG_FILE_NAME.to_string(),
        }
    }
}

impl StoreSection {
    pub fn open(&self) -> ConfigStore {
        ConfigStore::in_dir(self.dir.as_deref(), &self.file_name)
    }
}

/// 从 config 目录加载配置，环境变量 AUTOTUNE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 AUTOTUNE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("AUTOTUNE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
