pub mod rclone;
pub mod remote_config;

#[cfg(test)]
pub(crate) mod mock;

use crate::error::EngineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use rclone::RcloneEngine;
pub use remote_config::{remote_path, Credentials, ScopedConfig, SftpRemote, REMOTE_NAME};

/// 传输操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferOp {
    /// 本地 -> 远程
    Upload,
    /// 远程 -> 本地
    Download,
    /// 本地目录镜像到远程
    Sync,
}

impl TransferOp {
    /// 对应的 rclone 子命令
    pub fn verb(self) -> &'static str {
        match self {
            TransferOp::Upload | TransferOp::Download => "copy",
            TransferOp::Sync => "sync",
        }
    }
}

impl std::fmt::Display for TransferOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferOp::Upload => write!(f, "upload"),
            TransferOp::Download => write!(f, "download"),
            TransferOp::Sync => write!(f, "sync"),
        }
    }
}

/// 一次引擎调用
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub op: TransferOp,
    /// 本地路径或 `remote:path`
    pub source: String,
    pub destination: String,
    pub config_path: PathBuf,
    /// 引擎详细日志，None 时不落盘
    pub log_file: Option<PathBuf>,
}

impl TransferRequest {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.source.trim().is_empty() {
            return Err(EngineError::EmptyEndpoint("source"));
        }
        if self.destination.trim().is_empty() {
            return Err(EngineError::EmptyEndpoint("destination"));
        }
        Ok(())
    }
}

/// 外部同步引擎抽象接口
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// 执行一次复制/同步，阻塞到引擎进程退出
    async fn transfer(&self, request: &TransferRequest) -> Result<(), EngineError>;

    /// 将明文密码转换为引擎配置文件接受的混淆格式
    async fn obscure(&self, password: &str) -> Result<String, EngineError>;

    /// 列出远程目录
    async fn list(&self, remote: &str, config_path: &Path) -> Result<Vec<String>, EngineError>;

    /// 获取引擎名称（用于日志）
    fn name(&self) -> &str;
}

/// 使用临时生成的远程配置执行一次传输，配置文件随调用结束删除
#[allow(clippy::too_many_arguments)]
pub async fn transfer_with_credentials(
    engine: &dyn TransferEngine,
    op: TransferOp,
    source: &str,
    destination: &str,
    remote: &SftpRemote,
    credentials: &Credentials,
    config_dir: &Path,
    trace_id: &str,
    log_file: Option<&Path>,
) -> Result<(), EngineError> {
    let config = ScopedConfig::create(engine, remote, credentials, config_dir, trace_id).await?;

    let request = TransferRequest {
        op,
        source: source.to_string(),
        destination: destination.to_string(),
        config_path: config.path().to_path_buf(),
        log_file: log_file.map(Path::to_path_buf),
    };

    engine.transfer(&request).await
}
