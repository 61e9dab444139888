//! 批量下载命令

use super::{ensure_dir, ConnectionArgs};
use crate::core::{BatchOptions, BatchRunner, TransferJob};
use crate::error::SetupError;
use crate::AppState;
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Args)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// 本地下载目录
    #[arg(long, env = "SFTP_LOCAL_PATH")]
    pub local_path: Option<PathBuf>,

    /// 远程路径列表文件，每行一个
    #[arg(long, env = "SFTP_FILE_LIST")]
    pub file_list: Option<PathBuf>,

    /// 最大并发数
    #[arg(long)]
    pub max_concurrent: Option<usize>,
}

/// 解析路径列表：去除首尾空白，跳过空行和 `#` 注释行
pub fn parse_file_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub fn read_file_list(path: &Path) -> Result<Vec<String>, SetupError> {
    let content = std::fs::read_to_string(path).map_err(|source| SetupError::FileList {
        path: path.to_path_buf(),
        source,
    })?;

    let paths = parse_file_list(&content);
    if paths.is_empty() {
        return Err(SetupError::EmptyFileList(path.to_path_buf()));
    }
    Ok(paths)
}

/// 执行批量下载，返回各任务的 (trace id, 远程路径)
///
/// 任何任务启动前的检查失败都返回错误；单个任务失败只记录在其状态中。
pub async fn run(
    state: &AppState,
    args: &DownloadArgs,
) -> Result<Vec<(String, String)>, SetupError> {
    let credentials = args.connection.credentials()?;
    let local_path = args
        .local_path
        .as_ref()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or(SetupError::MissingArgument("local path"))?;
    let file_list = args
        .file_list
        .as_ref()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or(SetupError::MissingArgument("file list"))?;

    let remote_paths = read_file_list(file_list)?;

    let store = state.status_store();
    let log_dir = state.log_dir();
    ensure_dir(local_path)?;
    ensure_dir(&log_dir)?;
    ensure_dir(store.dir())?;

    let destination = local_path.to_string_lossy();
    let jobs: Vec<TransferJob> = remote_paths
        .iter()
        .map(|path| TransferJob::download(path, &destination))
        .collect();

    let options = BatchOptions {
        remote: args.connection.remote(state),
        credentials,
        log_dir,
        config_dir: std::env::temp_dir(),
    };
    let max_concurrent = args
        .max_concurrent
        .unwrap_or(state.config.batch.max_concurrent);

    info!(
        "提交 {} 个下载任务 -> {}",
        jobs.len(),
        local_path.display()
    );
    let runner = BatchRunner::new(state.engine.clone(), store, options);
    let trace_ids = runner.run_batch(jobs, max_concurrent).await;

    Ok(trace_ids.into_iter().zip(remote_paths).collect())
}
