//! 单次上传与远程目录列表命令

use super::ConnectionArgs;
use crate::error::{EngineError, SetupError};
use crate::transfer::{self, remote_path, ScopedConfig, TransferOp};
use crate::AppState;
use clap::Args;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone, Args)]
pub struct UploadArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// 本地文件或目录
    pub source: PathBuf,

    /// 远程目标目录
    pub destination: String,

    /// 引擎日志文件
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// 远程目录
    #[arg(default_value = "/")]
    pub path: String,
}

/// 上传本地文件或目录，返回本次调用的 trace id
pub async fn upload(state: &AppState, args: &UploadArgs) -> Result<String, CommandError> {
    let credentials = args.connection.credentials()?;
    let remote = args.connection.remote(state);
    let trace_id = Uuid::new_v4().to_string();
    let destination = remote_path(&args.destination);

    info!(
        "上传 [{}]: {} -> {}",
        trace_id,
        args.source.display(),
        destination
    );
    transfer::transfer_with_credentials(
        state.engine.as_ref(),
        TransferOp::Upload,
        &args.source.to_string_lossy(),
        &destination,
        &remote,
        &credentials,
        &std::env::temp_dir(),
        &trace_id,
        args.log_file.as_deref(),
    )
    .await?;

    Ok(trace_id)
}

/// 列出远程目录内容
pub async fn list(state: &AppState, args: &ListArgs) -> Result<Vec<String>, CommandError> {
    let credentials = args.connection.credentials()?;
    let remote = args.connection.remote(state);
    let trace_id = Uuid::new_v4().to_string();

    let config = ScopedConfig::create(
        state.engine.as_ref(),
        &remote,
        &credentials,
        &std::env::temp_dir(),
        &trace_id,
    )
    .await?;

    let entries = state
        .engine
        .list(&remote_path(&args.path), config.path())
        .await?;
    Ok(entries)
}
