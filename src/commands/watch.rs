//! 目录监控命令

use crate::daemon::{WatchConfig, WatchDaemon, WatchMode};
use crate::error::SetupError;
use crate::AppState;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Args)]
pub struct WatchArgs {
    /// 监控的本地目录
    #[arg(long)]
    pub dir: PathBuf,

    /// 远程目录（引擎地址格式，如 `sftp:/upload`）
    #[arg(long)]
    pub remote_root: String,

    /// rclone 配置文件
    #[arg(long)]
    pub config: PathBuf,

    /// 引擎日志文件
    #[arg(long)]
    pub engine_log: Option<PathBuf>,

    /// 守护进程日志文件（同时输出到控制台）
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// 触发后上传单个文件还是同步整个目录
    #[arg(long, value_enum)]
    pub mode: Option<WatchMode>,

    /// 定时同步间隔（秒），0 表示关闭
    #[arg(long)]
    pub sync_interval: Option<u64>,

    /// 事件去抖延迟（秒）
    #[arg(long)]
    pub debounce: Option<u64>,
}

impl WatchArgs {
    /// 合并命令行与配置文件
    pub fn to_config(&self, state: &AppState) -> WatchConfig {
        let settings = &state.config.watch;
        WatchConfig {
            watch_dir: self.dir.clone(),
            remote_root: self.remote_root.clone(),
            config_path: self.config.clone(),
            engine_log: self.engine_log.clone(),
            mode: self.mode.unwrap_or(settings.mode),
            debounce: self
                .debounce
                .map(Duration::from_secs)
                .unwrap_or_else(|| settings.debounce()),
            stability_interval: settings.stability_interval(),
            sync_interval: self
                .sync_interval
                .map(Duration::from_secs)
                .unwrap_or_else(|| settings.sync_interval()),
            shutdown_grace: settings.shutdown_grace(),
        }
    }
}

/// 运行守护进程，直到收到 Ctrl-C 或 SIGTERM
pub async fn run(state: &AppState, args: &WatchArgs) -> Result<(), SetupError> {
    let daemon = WatchDaemon::new(state.engine.clone(), args.to_config(state));

    let token = CancellationToken::new();
    tokio::spawn({
        let token = token.clone();
        async move {
            shutdown_signal().await;
            info!("收到退出信号，正在停止...");
            token.cancel();
        }
    });

    daemon.run(token).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("监听 Ctrl-C 失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("监听 SIGTERM 失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
