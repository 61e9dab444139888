use clap::{Parser, Subcommand};
use sftpsync_lib::commands::{download, status, transfer, watch};
use sftpsync_lib::logging::{LogConfig, SizeRotatingWriter};
use sftpsync_lib::config::{self, AppConfig};
use sftpsync_lib::AppState;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// 基于 rclone 的 SFTP 批量传输与目录监控工具
#[derive(Parser)]
#[command(name = "sftpsync", version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// 数据目录（存放 config.json，相对路径以此为基准）
    #[arg(long, env = "SFTPSYNC_DATA_DIR", default_value = ".", global = true)]
    data_dir: PathBuf,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 按列表批量下载远程路径
    Download(download::DownloadArgs),
    /// 查询任务状态
    Status(status::StatusArgs),
    /// 上传本地文件或目录
    Upload(transfer::UploadArgs),
    /// 列出远程目录
    List(transfer::ListArgs),
    /// 监控目录并自动上传
    Watch(watch::WatchArgs),
}

/// 初始化日志系统
///
/// 始终输出到 stderr；指定日志文件时同时写入文件（按大小轮转）。
/// 返回的 guard 需要保持到程序退出，否则缓冲中的日志会丢失。
fn init_logging(config: &LogConfig, verbose: bool, log_file: Option<&Path>) -> Option<WorkerGuard> {
    if !config.enabled {
        // 日志已禁用，只初始化一个空的 subscriber
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
        return None;
    }

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        config.tracing_level()
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let mut guard = None;
    let file_layer = log_file.and_then(|path| {
        match SizeRotatingWriter::new(path, config.max_size_bytes()) {
            Ok(writer) => {
                let (writer, worker_guard) = tracing_appender::non_blocking(writer);
                guard = Some(worker_guard);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(false),
                )
            }
            Err(e) => {
                // 文件日志创建失败，回退到控制台
                eprintln!("无法打开日志文件 {}: {}", path.display(), e);
                None
            }
        }
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    guard
}

async fn run(cli: Cli, state: AppState) -> anyhow::Result<()> {
    match cli.command {
        Commands::Download(args) => {
            let results = download::run(&state, &args).await?;
            println!("All downloads completed.");
            for (trace_id, remote_path) in results {
                println!("{}  {}", trace_id, remote_path);
            }
        }
        Commands::Status(args) => {
            println!("{}", status::run(&state, &args).await?);
        }
        Commands::Upload(args) => {
            let trace_id = transfer::upload(&state, &args).await?;
            println!("Upload completed: {}", trace_id);
        }
        Commands::List(args) => {
            for entry in transfer::list(&state, &args).await? {
                println!("{}", entry);
            }
        }
        Commands::Watch(args) => watch::run(&state, &args).await?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    // 日志配置来自 config.json，回退警告要等日志初始化后再输出
    let (app_config, load_error) = AppConfig::load(&cli.data_dir);

    let log_file = match &cli.command {
        Commands::Watch(args) => args
            .log_file
            .as_deref()
            .map(|p| app_config.resolve(&cli.data_dir, p)),
        _ => None,
    };
    let log_enabled = app_config.log.enabled;
    let _guard = init_logging(&app_config.log, cli.verbose, log_file.as_deref());

    if let Some(e) = &load_error {
        if log_enabled {
            config::report_fallback(e);
        } else {
            eprintln!("Warning: {}，使用默认配置", e);
        }
    }

    let state = AppState::new(&cli.data_dir, app_config);

    match run(cli, state).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if log_enabled {
                tracing::error!("{:#}", e);
            } else {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}
