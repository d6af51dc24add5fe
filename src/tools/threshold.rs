//! 阈值工具服务
//!
//! ThresholdService 持有唯一的互斥锁与 ConfigStore，启动时构建一次并显式传给调用方。
//! 临界区 = 锁内 load → 记录 old → save。只有等锁可以超时；一旦进入临界区就必须跑完，
//! 锁守卫随阻塞任务一起移动，调用方被取消（客户端断开）时写入仍会完成并记录日志。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::core::{ActionResult, Threshold, ToolError};
use crate::store::ConfigStore;
use crate::tools::command::ToolCommand;
use crate::tools::schema::{adjust_threshold_schema, ADJUST_THRESHOLD};
use crate::tools::Tool;

/// 默认等锁上限
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ThresholdService {
    store: ConfigStore,
    lock: Arc<Mutex<()>>,
    lock_timeout: Duration,
}

impl ThresholdService {
    pub fn new(store: ConfigStore) -> Self {
        Self::with_lock_timeout(store, DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(store: ConfigStore, lock_timeout: Duration) -> Self {
        Self {
            store,
            lock: Arc::new(Mutex::new(())),
            lock_timeout,
        }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// 在锁内读取当前阈值
    pub async fn current(&self) -> Threshold {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        let store = self.store.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            store.load()
        })
        .await;
        loaded_or_default(joined)
    }

    /// 解码参数并应用；参数不合法时直接返回，不取锁
    pub async fn adjust_threshold(&self, arguments: &Value) -> Result<ActionResult, ToolError> {
        match ToolCommand::decode(ADJUST_THRESHOLD, arguments)? {
            ToolCommand::AdjustThreshold { value } => self.apply(value).await,
        }
    }

    /// 临界区：load-mutate-save 作为一个整体执行
    ///
    /// 返回 Persistence 错误时磁盘上的值一定没有变化。
    pub async fn apply(&self, new_value: Threshold) -> Result<ActionResult, ToolError> {
        let guard = timeout(self.lock_timeout, Arc::clone(&self.lock).lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(
                    value = new_value.value(),
                    "Timed out waiting for the threshold lock"
                );
                ToolError::Persistence(format!(
                    "timed out after {:?} waiting for the threshold lock",
                    self.lock_timeout
                ))
            })?;

        let store = self.store.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let old_value = store.load();
            match store.save(new_value) {
                Ok(()) => {
                    tracing::info!(
                        old_value = old_value.value(),
                        new_value = new_value.value(),
                        "Threshold updated from {} to {}",
                        old_value,
                        new_value
                    );
                    Ok(ActionResult::success(old_value, new_value))
                }
                Err(e) => {
                    tracing::error!(value = new_value.value(), error = %e, "Failed to save threshold");
                    Err(ToolError::Persistence(e.to_string()))
                }
            }
        })
        .await;

        outcome.unwrap_or_else(|e| Err(ToolError::Persistence(format!("persistence task failed: {e}"))))
    }
}

fn loaded_or_default(joined: Result<Threshold, tokio::task::JoinError>) -> Threshold {
    joined.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Threshold read task failed, using default");
        Threshold::default()
    })
}

/// adjust_threshold 工具：把 MCP tools/call 接到 ThresholdService
pub struct AdjustThresholdTool {
    service: Arc<ThresholdService>,
}

impl AdjustThresholdTool {
    pub fn new(service: Arc<ThresholdService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for AdjustThresholdTool {
    fn name(&self) -> &str {
        ADJUST_THRESHOLD
    }

    fn description(&self) -> &str {
        "Dynamically adjust the CPU alert threshold (0~100)"
    }

    fn input_schema(&self) -> Value {
        adjust_threshold_schema()
    }

    async fn call(&self, args: Value) -> Result<ActionResult, ToolError> {
        self.service.adjust_threshold(&args).await
    }
}
