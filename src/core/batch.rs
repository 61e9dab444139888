//! 批量传输调度 - 有界并发执行多个独立任务，并为每个任务维护状态记录

use crate::core::summary;
use crate::core::task::{TaskStatus, TaskStore};
use crate::transfer::{
    Credentials, ScopedConfig, SftpRemote, TransferEngine, TransferOp, TransferRequest,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 单个传输任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    pub op: TransferOp,
    /// 引擎地址格式：本地路径或 `remote:path`
    pub source: String,
    pub destination: String,
}

impl TransferJob {
    /// 从远程路径下载到本地目录
    pub fn download(remote_path: &str, local_path: &str) -> Self {
        Self {
            op: TransferOp::Download,
            source: crate::transfer::remote_path(remote_path),
            destination: local_path.to_string(),
        }
    }
}

/// 批次内所有任务共享的参数
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub remote: SftpRemote,
    pub credentials: Credentials,
    /// 引擎日志与概要日志目录
    pub log_dir: PathBuf,
    /// 临时配置文件目录
    pub config_dir: PathBuf,
}

struct JobContext {
    engine: Arc<dyn TransferEngine>,
    store: TaskStore,
    options: BatchOptions,
}

/// 已提交的任务，保留写入异常终态所需的信息
struct Spawned {
    trace_id: String,
    source: String,
    destination: String,
    handle: JoinHandle<()>,
}

/// 批量调度器
pub struct BatchRunner {
    ctx: Arc<JobContext>,
}

impl BatchRunner {
    pub fn new(engine: Arc<dyn TransferEngine>, store: TaskStore, options: BatchOptions) -> Self {
        Self {
            ctx: Arc::new(JobContext {
                engine,
                store,
                options,
            }),
        }
    }

    /// 运行一批任务，最多 `max_concurrent` 个同时进行
    ///
    /// 所有任务进入终态后才返回，返回值为按提交顺序排列的 trace id。
    /// 单个任务失败只记录在其状态中，不影响其他任务。
    pub async fn run_batch(&self, jobs: Vec<TransferJob>, max_concurrent: usize) -> Vec<String> {
        if jobs.is_empty() {
            info!("任务列表为空，无需执行");
            return Vec::new();
        }

        let permits = if max_concurrent == 0 {
            warn!("并发数为 0，按 1 处理");
            1
        } else {
            max_concurrent.min(Semaphore::MAX_PERMITS)
        };

        info!("开始批量传输: {} 个任务, 并发数 {}", jobs.len(), permits);

        let semaphore = Arc::new(Semaphore::new(permits));
        let mut trace_ids = Vec::with_capacity(jobs.len());
        let mut spawned = Vec::with_capacity(jobs.len());

        for job in jobs {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                // 信号量不会被关闭
                break;
            };

            let trace_id = Uuid::new_v4().to_string();
            trace_ids.push(trace_id.clone());

            let ctx = self.ctx.clone();
            let source = job.source.clone();
            let destination = job.destination.clone();
            let id = trace_id.clone();
            let handle = tokio::spawn(async move {
                run_job(&ctx, job, id).await;
                drop(permit);
            });
            spawned.push(Spawned {
                trace_id,
                source,
                destination,
                handle,
            });
        }

        // 等待所有任务完成
        for Spawned {
            trace_id,
            source,
            destination,
            handle,
        } in spawned
        {
            if let Err(e) = handle.await {
                let message = abnormal_exit_message(e);
                error!("任务异常退出 {}: {}", trace_id, message);
                self.record_abnormal_exit(trace_id, source, destination, message)
                    .await;
            }
        }

        info!("批量传输结束: {} 个任务", trace_ids.len());
        trace_ids
    }

    /// 任务 panic 时记录停留在 pending 或 downloading，这里补写失败终态
    async fn record_abnormal_exit(
        &self,
        trace_id: String,
        source: String,
        destination: String,
        message: String,
    ) {
        let store = &self.ctx.store;
        let mut task = match store.load(&trace_id).await {
            Ok(task) => task,
            Err(e) => {
                debug!("任务记录不可用 {}: {}，重新创建", trace_id, e);
                TaskStatus::new(
                    trace_id,
                    source,
                    destination,
                    self.ctx.options.log_dir.clone(),
                )
            }
        };
        if task.status().is_terminal() {
            return;
        }
        fail_job(store, &mut task, message).await;
    }
}

fn abnormal_exit_message(err: JoinError) -> String {
    if !err.is_panic() {
        return format!("task aborted: {}", err);
    }
    let payload = err.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("task panicked: {}", detail)
}

/// 持久化失败只记录日志，任务继续执行
async fn persist(store: &TaskStore, task: &TaskStatus) {
    if let Err(e) = store.save(task).await {
        warn!("保存任务状态失败 {}: {}", task.trace_id, e);
    }
}

async fn fail_job(store: &TaskStore, task: &mut TaskStatus, message: String) {
    error!("任务失败 {}: {}", task.trace_id, message);
    if let Err(e) = task.fail(message) {
        error!("任务状态迁移失败 {}: {}", task.trace_id, e);
    }
    persist(store, task).await;
}

async fn run_job(ctx: &JobContext, job: TransferJob, trace_id: String) {
    let options = &ctx.options;
    let mut task = TaskStatus::new(
        trace_id.clone(),
        job.source.clone(),
        job.destination.clone(),
        options.log_dir.clone(),
    );
    persist(&ctx.store, &task).await;

    if let Err(e) = tokio::fs::create_dir_all(&options.log_dir).await {
        fail_job(
            &ctx.store,
            &mut task,
            format!("failed to create log directory: {}", e),
        )
        .await;
        return;
    }
    let log_file = options.log_dir.join(format!("{}.log", trace_id));

    let config = match ScopedConfig::create(
        ctx.engine.as_ref(),
        &options.remote,
        &options.credentials,
        &options.config_dir,
        &trace_id,
    )
    .await
    {
        Ok(config) => config,
        Err(e) => {
            fail_job(&ctx.store, &mut task, e.to_string()).await;
            return;
        }
    };

    if let Err(e) = task.start() {
        error!("任务状态迁移失败 {}: {}", trace_id, e);
    }
    persist(&ctx.store, &task).await;
    info!(
        "开始{} [{}] ({}): {} -> {}",
        job.op,
        trace_id,
        ctx.engine.name(),
        job.source,
        job.destination
    );

    let request = TransferRequest {
        op: job.op,
        source: job.source,
        destination: job.destination,
        config_path: config.path().to_path_buf(),
        log_file: Some(log_file),
    };
    let result = ctx.engine.transfer(&request).await;
    drop(config);

    match result {
        Ok(()) => {
            if let Err(e) = task.complete() {
                error!("任务状态迁移失败 {}: {}", trace_id, e);
            }
            persist(&ctx.store, &task).await;
            info!("任务完成 [{}]", trace_id);

            if request.op == TransferOp::Download {
                match summary::write_summary(&task).await {
                    Ok(path) => debug!("已写入概要日志: {}", path.display()),
                    Err(e) => warn!("写入概要日志失败 {}: {}", trace_id, e),
                }
            }
        }
        Err(e) => fail_job(&ctx.store, &mut task, e.to_string()).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::TaskState;
    use crate::transfer::mock::MockEngine;
    use std::collections::HashSet;
    use std::time::Duration;

    struct Fixture {
        _tmp: tempfile::TempDir,
        store: TaskStore,
        options: BatchOptions,
        dest: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("dest");
        let config_dir = tmp.path().join("conf");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::create_dir_all(&config_dir).unwrap();

        Fixture {
            store: TaskStore::new(tmp.path().join("status")),
            options: BatchOptions {
                remote: SftpRemote::new("127.0.0.1", 22),
                credentials: Credentials::new("deploy", Some("pw".into()), None).unwrap(),
                log_dir: tmp.path().join("logs"),
                config_dir,
            },
            dest,
            _tmp: tmp,
        }
    }

    fn jobs(fx: &Fixture, count: usize) -> Vec<TransferJob> {
        (0..count)
            .map(|i| TransferJob::download(&format!("/remote/dir{}", i), fx.dest.to_str().unwrap()))
            .collect()
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let fx = fixture();
        let engine = Arc::new(MockEngine::new());
        let runner = BatchRunner::new(engine.clone(), fx.store.clone(), fx.options.clone());

        assert!(runner.run_batch(Vec::new(), 3).await.is_empty());
        assert!(engine.calls().is_empty());
        assert!(!fx.store.dir().exists());
    }

    #[tokio::test]
    async fn concurrency_is_bounded_and_every_job_terminates() {
        let fx = fixture();
        let engine = Arc::new(MockEngine::with_delay(Duration::from_millis(40)));
        let runner = BatchRunner::new(engine.clone(), fx.store.clone(), fx.options.clone());

        let ids = runner.run_batch(jobs(&fx, 7), 3).await;

        assert_eq!(ids.len(), 7);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 7);
        assert!(engine.max_active() <= 3);
        assert!(engine.max_active() >= 2);
        for id in &ids {
            let task = fx.store.load(id).await.unwrap();
            assert_eq!(task.status(), TaskState::Completed);
            assert!(task.end_time().is_some());
        }
    }

    #[tokio::test]
    async fn failed_job_is_recorded_and_siblings_complete() {
        let fx = fixture();
        let engine = Arc::new(MockEngine::failing_for("sftp:/remote/dir1"));
        let runner = BatchRunner::new(engine.clone(), fx.store.clone(), fx.options.clone());

        let ids = runner.run_batch(jobs(&fx, 3), 2).await;

        let mut failed = 0;
        for id in &ids {
            let task = fx.store.load(id).await.unwrap();
            if task.source == "sftp:/remote/dir1" {
                failed += 1;
                assert_eq!(task.status(), TaskState::Failed);
                assert!(!task.error().unwrap_or_default().is_empty());
                assert!(task.end_time().is_some());
            } else {
                assert_eq!(task.status(), TaskState::Completed);
                assert!(task.error().is_none());
            }
        }
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn panicking_job_is_recorded_as_failed() {
        let fx = fixture();
        let engine = Arc::new(MockEngine::panicking_for("sftp:/remote/dir0"));
        let runner = BatchRunner::new(engine.clone(), fx.store.clone(), fx.options.clone());

        let ids = runner.run_batch(jobs(&fx, 3), 2).await;
        assert_eq!(ids.len(), 3);
        assert_eq!(engine.calls().len(), 3);

        let crashed = fx.store.load(&ids[0]).await.unwrap();
        assert_eq!(crashed.source, "sftp:/remote/dir0");
        assert_eq!(crashed.status(), TaskState::Failed);
        assert!(crashed.end_time().is_some());
        let error = crashed.error().unwrap();
        assert!(error.contains("task panicked"));
        assert!(error.contains("engine crashed on sftp:/remote/dir0"));

        for id in &ids[1..] {
            assert_eq!(fx.store.load(id).await.unwrap().status(), TaskState::Completed);
        }

        // 临时配置在 panic 展开时也被清理
        assert_eq!(std::fs::read_dir(&fx.options.config_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn zero_concurrency_is_coerced_to_one() {
        let fx = fixture();
        let engine = Arc::new(MockEngine::with_delay(Duration::from_millis(5)));
        let runner = BatchRunner::new(engine.clone(), fx.store.clone(), fx.options.clone());

        let ids = runner.run_batch(jobs(&fx, 3), 0).await;
        assert_eq!(ids.len(), 3);
        assert_eq!(engine.max_active(), 1);
    }

    #[tokio::test]
    async fn engine_gets_per_job_config_and_log_file() {
        let fx = fixture();
        let engine = Arc::new(MockEngine::new());
        let runner = BatchRunner::new(engine.clone(), fx.store.clone(), fx.options.clone());

        let ids = runner.run_batch(jobs(&fx, 2), 2).await;

        let calls = engine.calls();
        assert_eq!(calls.len(), 2);
        for call in &calls {
            assert_eq!(call.op, TransferOp::Download);
            let stem = call
                .config_path
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned();
            let id = stem
                .strip_prefix("rclone_")
                .and_then(|s| s.strip_suffix(".conf"))
                .unwrap();
            assert!(ids.iter().any(|t| t == id));
            assert_eq!(
                call.log_file.as_deref(),
                Some(fx.options.log_dir.join(format!("{}.log", id)).as_path())
            );
        }

        // 临时配置全部清理
        assert_eq!(engine.configs_seen().len(), 2);
        assert_eq!(std::fs::read_dir(&fx.options.config_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn successful_download_writes_summary() {
        let fx = fixture();
        std::fs::write(fx.dest.join("x.dat"), b"12345").unwrap();
        let engine = Arc::new(MockEngine::new());
        let runner = BatchRunner::new(engine, fx.store.clone(), fx.options.clone());

        let ids = runner.run_batch(jobs(&fx, 1), 1).await;

        let summary = fx.options.log_dir.join(format!("download_{}.log", ids[0]));
        let content = std::fs::read_to_string(summary).unwrap();
        assert!(content.contains("Total Files: 1"));
    }

    #[tokio::test]
    async fn config_failure_marks_job_failed() {
        let mut fx = fixture();
        fx.options.config_dir = fx.dest.join("no-such-dir");
        let engine = Arc::new(MockEngine::new());
        let runner = BatchRunner::new(engine.clone(), fx.store.clone(), fx.options.clone());

        let ids = runner.run_batch(jobs(&fx, 1), 1).await;

        let task = fx.store.load(&ids[0]).await.unwrap();
        assert_eq!(task.status(), TaskState::Failed);
        assert!(task.error().unwrap().contains("config file"));
        assert!(engine.calls().is_empty());
    }
}
