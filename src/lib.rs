use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod commands;
pub mod config;
pub mod core;
pub mod daemon;
pub mod error;
pub mod logging;
pub mod transfer;

pub use crate::core::{BatchOptions, BatchRunner, TransferJob, TaskState, TaskStatus, TaskStore};
pub use config::AppConfig;
pub use daemon::{WatchConfig, WatchDaemon, WatchMode};
pub use transfer::{RcloneEngine, TransferEngine, TransferOp};

/// 应用状态，在各子命令间共享
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub data_dir: PathBuf,
    pub engine: Arc<dyn TransferEngine>,
}

impl AppState {
    /// 使用已加载的配置，以 rclone 作为传输引擎
    pub fn new(data_dir: impl Into<PathBuf>, config: AppConfig) -> Self {
        let engine = Arc::new(RcloneEngine::new(
            config.engine.program.clone(),
            config.engine.log_level.clone(),
        ));
        Self::with_engine(data_dir, config, engine)
    }

    pub fn with_engine(
        data_dir: impl Into<PathBuf>,
        config: AppConfig,
        engine: Arc<dyn TransferEngine>,
    ) -> Self {
        Self {
            config,
            data_dir: data_dir.into(),
            engine,
        }
    }

    /// 相对路径按数据目录解析
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.config.resolve(&self.data_dir, path)
    }

    pub fn status_store(&self) -> TaskStore {
        TaskStore::new(self.resolve(&self.config.batch.status_dir))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.resolve(&self.config.batch.log_dir)
    }

    pub fn sftp_remote(&self) -> transfer::SftpRemote {
        transfer::SftpRemote::new(self.config.sftp.host.clone(), self.config.sftp.port)
    }
}
