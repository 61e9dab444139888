//! 错误类型
//!
//! | 类型 | 影响范围 | 说明 |
//! |------|----------|------|
//! | `SetupError` | 整个批次 | 参数缺失、任务列表不可读、目录无法创建，任何任务启动前终止 |
//! | `EngineError` | 单个任务 | 引擎非零退出、密码混淆失败、临时配置写入失败，记录到任务状态 |
//! | `StatusError` | 单条记录 | 状态文件读写、解析与状态迁移错误 |

use crate::core::task::TaskState;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// 启动阶段错误
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("SFTP user is not set")]
    MissingUser,

    #[error("password or private key path is required")]
    MissingCredentials,

    #[error("{0} is not set")]
    MissingArgument(&'static str),

    #[error("failed to read file list {path}: {source}")]
    FileList {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no remote paths found in file list {0}")]
    EmptyFileList(PathBuf),

    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("watch directory does not exist: {0}")]
    WatchDirMissing(PathBuf),

    #[error("failed to watch {path}: {source}")]
    Watcher {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// 外部传输引擎错误，只影响所属任务
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} must not be empty")]
    EmptyEndpoint(&'static str),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("rclone {verb} failed ({status}): {stderr}")]
    Exit {
        verb: String,
        status: String,
        stderr: String,
    },

    #[error("failed to obscure password: {0}")]
    Obscure(String),

    #[error("failed to write config file {path}: {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// 任务状态存储错误
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("task {0} not found")]
    NotFound(String),

    #[error("task {trace_id} has a corrupt status record: {source}")]
    Parse {
        trace_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode status of task {trace_id}: {source}")]
    Encode {
        trace_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid trace id: {0:?}")]
    InvalidTraceId(String),

    #[error("status file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("illegal status transition {from} -> {to}")]
    InvalidTransition { from: TaskState, to: TaskState },
}
