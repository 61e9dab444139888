//! 应用配置模块
//!
//! 配置保存在数据目录的 `config.json` 中，按模块分节，每一项都有默认值，
//! 文件不存在或缺少某些字段时使用默认配置。键名使用 camelCase。

use crate::daemon::WatchMode;
use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE: &str = "config.json";

/// SFTP 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SftpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for SftpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 22,
        }
    }
}

/// 传输引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// rclone 可执行文件
    pub program: String,
    /// 引擎日志级别
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "rclone".to_string(),
            log_level: "INFO".to_string(),
        }
    }
}

/// 批量下载配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchConfig {
    pub max_concurrent: usize,
    /// 任务状态记录目录
    pub status_dir: PathBuf,
    /// 引擎日志与下载概要目录
    pub log_dir: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            status_dir: PathBuf::from("./logs/sftp-download-status"),
            log_dir: PathBuf::from("./logs"),
        }
    }
}

/// 目录监控配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatchSettings {
    pub debounce_secs: u64,
    pub stability_secs: u64,
    pub sync_interval_secs: u64,
    pub shutdown_grace_secs: u64,
    pub mode: WatchMode,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce_secs: 2,
            stability_secs: 1,
            sync_interval_secs: 600, // 10 分钟
            shutdown_grace_secs: 30,
            mode: WatchMode::File,
        }
    }
}

impl WatchSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn stability_interval(&self) -> Duration {
        Duration::from_secs(self.stability_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// 完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub sftp: SftpConfig,
    pub engine: EngineConfig,
    pub batch: BatchConfig,
    pub watch: WatchSettings,
    pub log: LogConfig,
}

/// 配置文件存在但无法使用
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件失败 {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("解析配置文件失败 {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl AppConfig {
    /// 从数据目录读取配置，文件不存在时返回默认配置
    pub fn try_load(data_dir: &Path) -> Result<Self, ConfigError> {
        let config_file = data_dir.join(CONFIG_FILE);
        let content = match fs::read_to_string(&config_file) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: config_file,
                    source,
                })
            }
        };

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: config_file,
            source,
        })
    }

    /// 加载配置，失败时回退到默认配置并返回失败原因
    ///
    /// 配置决定日志如何初始化，所以这里不直接输出警告，
    /// 由调用方在日志就绪后交给 [`report_fallback`]。
    pub fn load(data_dir: &Path) -> (Self, Option<ConfigError>) {
        match Self::try_load(data_dir) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// 相对路径按数据目录解析
    pub fn resolve(&self, data_dir: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            data_dir.join(path)
        }
    }
}

/// 输出配置回退警告
pub fn report_fallback(err: &ConfigError) {
    tracing::warn!("{}，使用默认配置", err);
}
