//! 目录监控守护进程
//!
//! 监听目录中的创建/修改事件，等待文件写入稳定后上传；另有定时全量同步作为兜底。
//! 同一守护进程的所有引擎调用经过一个单槽闸门串行执行：
//! 单文件上传排队等待，定时同步遇到闸门被占用时直接跳过。

pub mod inflight;

pub use inflight::{InFlight, InFlightGuard};

use crate::core::stability::StabilityDetector;
use crate::error::SetupError;
use crate::transfer::{TransferEngine, TransferOp, TransferRequest};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// 触发后的传输方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// 只上传触发事件的文件
    #[default]
    File,
    /// 同步整个监控目录
    Directory,
}

/// 守护进程参数
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub watch_dir: PathBuf,
    /// 远程目录，引擎地址格式（如 `sftp:/upload`）
    pub remote_root: String,
    /// 预先准备好的引擎配置文件
    pub config_path: PathBuf,
    pub engine_log: Option<PathBuf>,
    pub mode: WatchMode,
    pub debounce: Duration,
    pub stability_interval: Duration,
    /// 为 0 时关闭定时同步
    pub sync_interval: Duration,
    pub shutdown_grace: Duration,
}

/// 单次处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 文件仍在变化或已消失
    Unstable,
    /// 不需要传输（目录事件、定时同步被合并）
    Skipped,
    Transferred,
    Failed,
}

struct Shared {
    engine: Arc<dyn TransferEngine>,
    config: WatchConfig,
    in_flight: InFlight,
    gate: Mutex<()>,
    detector: StabilityDetector,
}

/// 目录监控守护进程
#[derive(Clone)]
pub struct WatchDaemon {
    shared: Arc<Shared>,
}

impl WatchDaemon {
    pub fn new(engine: Arc<dyn TransferEngine>, config: WatchConfig) -> Self {
        let detector = StabilityDetector::new(config.stability_interval);
        Self {
            shared: Arc::new(Shared {
                engine,
                config,
                in_flight: InFlight::new(),
                gate: Mutex::new(()),
                detector,
            }),
        }
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.shared.in_flight
    }

    /// 运行事件循环，直到 `shutdown` 被取消
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), SetupError> {
        let config = &self.shared.config;
        if !config.watch_dir.is_dir() {
            return Err(SetupError::WatchDirMissing(config.watch_dir.clone()));
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // 接收端关闭说明事件循环已退出
            let _ = tx.send(res);
        })
        .map_err(|source| SetupError::Watcher {
            path: config.watch_dir.clone(),
            source,
        })?;
        watcher
            .watch(&config.watch_dir, RecursiveMode::NonRecursive)
            .map_err(|source| SetupError::Watcher {
                path: config.watch_dir.clone(),
                source,
            })?;

        info!(
            "开始监控目录: {} -> {} (模式: {:?})",
            config.watch_dir.display(),
            config.remote_root,
            config.mode
        );

        // 第一次定时同步在一个周期之后
        let periodic = !config.sync_interval.is_zero();
        let period = config.sync_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("收到停止信号，退出监控循环");
                    break;
                }
                received = rx.recv() => match received {
                    Some(Ok(event)) => self.dispatch(&event, &tracker),
                    Some(Err(e)) => warn!("文件监控错误: {}", e),
                    None => {
                        warn!("文件监控通道已关闭");
                        break;
                    }
                },
                _ = ticker.tick(), if periodic => {
                    let daemon = self.clone();
                    tracker.spawn(async move {
                        daemon.periodic_sync().await;
                    });
                }
            }
        }

        drop(watcher);
        tracker.close();

        if !tracker.is_empty() {
            info!(
                "等待 {} 个处理中的任务结束（最长 {:?}）",
                tracker.len(),
                config.shutdown_grace
            );
        }
        if tokio::time::timeout(config.shutdown_grace, tracker.wait())
            .await
            .is_err()
        {
            warn!("等待超时，放弃 {} 个未完成的任务", tracker.len());
        }

        info!("目录监控已停止");
        Ok(())
    }

    fn dispatch(&self, event: &Event, tracker: &TaskTracker) {
        for path in relevant_paths(event) {
            let Some(guard) = self.shared.in_flight.claim(&path) else {
                debug!("文件正在处理中，忽略事件: {}", path.display());
                continue;
            };

            debug!("检测到文件变化: {}", path.display());
            let daemon = self.clone();
            tracker.spawn(async move {
                let outcome = daemon.handle_path(guard.path()).await;
                debug!("处理结束 {}: {:?}", guard.path().display(), outcome);
            });
        }
    }

    /// 登记并处理一个路径；路径已在处理中时返回 None
    pub async fn process_path(&self, path: &Path) -> Option<Outcome> {
        let guard = self.shared.in_flight.claim(path)?;
        Some(self.handle_path(guard.path()).await)
    }

    async fn handle_path(&self, path: &Path) -> Outcome {
        let shared = &self.shared;

        tokio::time::sleep(shared.config.debounce).await;

        if !shared.detector.is_stable(path).await {
            debug!("文件仍在写入或已不存在: {}", path.display());
            return Outcome::Unstable;
        }

        match shared.config.mode {
            WatchMode::File => {
                if path.is_dir() {
                    debug!("跳过目录: {}", path.display());
                    return Outcome::Skipped;
                }
                let _slot = shared.gate.lock().await;
                self.transfer(TransferOp::Upload, &path.to_string_lossy())
                    .await
            }
            WatchMode::Directory => {
                let _slot = shared.gate.lock().await;
                self.sync_directory().await
            }
        }
    }

    /// 定时全量同步，闸门被占用时跳过本轮
    pub async fn periodic_sync(&self) -> Outcome {
        let Ok(_slot) = self.shared.gate.try_lock() else {
            info!("已有传输在进行，跳过本轮定时同步");
            return Outcome::Skipped;
        };
        info!("执行定时同步");
        self.sync_directory().await
    }

    async fn sync_directory(&self) -> Outcome {
        let dir = self.shared.config.watch_dir.to_string_lossy().into_owned();
        self.transfer(TransferOp::Sync, &dir).await
    }

    async fn transfer(&self, op: TransferOp, source: &str) -> Outcome {
        let config = &self.shared.config;
        let request = TransferRequest {
            op,
            source: source.to_string(),
            destination: config.remote_root.clone(),
            config_path: config.config_path.clone(),
            log_file: config.engine_log.clone(),
        };

        match self.shared.engine.transfer(&request).await {
            Ok(()) => {
                info!(
                    "{} 完成 [{}]: {} -> {}",
                    op,
                    self.shared.engine.name(),
                    source,
                    config.remote_root
                );
                Outcome::Transferred
            }
            Err(e) => {
                error!("{} 失败 [{}] {}: {}", op, self.shared.engine.name(), source, e);
                Outcome::Failed
            }
        }
    }
}

/// 事件中需要处理的路径：新建、内容修改、重命名后的目标
fn relevant_paths(event: &Event) -> Vec<PathBuf> {
    match &event.kind {
        EventKind::Create(_)
        | EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Any)
        | EventKind::Modify(ModifyKind::Name(RenameMode::To))
        // 部分平台只上报 Any，无法区分改名前后，交给稳定性检测过滤不存在的路径
        | EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().cloned().into_iter().collect()
        }
        _ => Vec::new(),
    }
}
