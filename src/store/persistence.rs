//! 阈值持久化
//!
//! 单文件 JSON：`{"cpu_alert_threshold": 80.0}`。
//! - load：文件不存在时写入默认值并返回；文件损坏或越界时记录日志、返回默认值，但不覆盖原文件
//! - save：同目录临时文件 → flush + fsync → rename 覆盖，崩溃时不会留下半截文件

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::core::{StoreError, Threshold};

/// 默认文件名
pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Serialize, Deserialize)]
struct StoredConfig {
    cpu_alert_threshold: f64,
}

/// 持久化的阈值存储；只持有解析好的路径，互斥由 ThresholdService 负责
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// `dir` 为 None 时使用可执行文件所在目录，取不到则用当前工作目录
    pub fn in_dir(dir: Option<&Path>, file_name: &str) -> Self {
        let dir = dir.map(Path::to_path_buf).unwrap_or_else(install_dir);
        Self::new(dir.join(file_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取当前阈值，永不失败：无文件时创建默认值，不可读或损坏时回退到内存默认值
    pub fn load(&self) -> Threshold {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let default = Threshold::default();
                match self.save(default) {
                    Ok(()) => tracing::info!(
                        path = %self.path.display(),
                        "Created default config file"
                    ),
                    Err(e) => tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Failed to create default config file"
                    ),
                }
                return default;
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read config file, using default config"
                );
                return Threshold::default();
            }
        };

        match parse(&data) {
            Ok(threshold) => threshold,
            Err(reason) => {
                tracing::warn!(
                    path = %self.path.display(),
                    reason = %reason,
                    "Failed to parse config file, using default config"
                );
                Threshold::default()
            }
        }
    }

    /// 原子写入阈值
    pub fn save(&self, threshold: Threshold) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;

        let data = serde_json::to_string_pretty(&StoredConfig {
            cpu_alert_threshold: threshold.value(),
        })?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| io_error(&dir, e))?;
        tmp.write_all(data.as_bytes())
            .and_then(|_| tmp.flush())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| io_error(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| io_error(&self.path, e.error))?;
        Ok(())
    }
}

fn parse(data: &str) -> Result<Threshold, String> {
    let stored: StoredConfig = serde_json::from_str(data).map_err(|e| e.to_string())?;
    Threshold::new(stored.cpu_alert_threshold).map_err(|e| e.to_string())
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// 可执行文件所在目录，失败时回退到当前工作目录
pub fn install_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}
