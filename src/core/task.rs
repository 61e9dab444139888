//! 任务状态管理 - 每个任务一条 JSON 记录，进程重启后仍可查询

use crate::error::StatusError;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Downloading,
    Completed,
    /// 旧版本在生成配置失败时写入的状态也视为失败
    #[serde(alias = "write config file failed")]
    Failed,
}

impl TaskState {
    /// 生命周期中的先后顺序，只允许向前迁移
    fn rank(self) -> u8 {
        match self {
            TaskState::Pending => 0,
            TaskState::Downloading => 1,
            TaskState::Completed | TaskState::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Downloading => write!(f, "downloading"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Failed => write!(f, "failed"),
        }
    }
}

/// 任务状态记录
///
/// `status`、`end_time`、`error` 只能通过 [`start`](Self::start)、
/// [`complete`](Self::complete)、[`fail`](Self::fail) 修改，终态记录不会再变化。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub trace_id: String,
    status: TaskState,
    pub start_time: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_end_time"
    )]
    end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    pub source: String,
    pub destination: String,
    /// 旧版本写入的记录使用 `logPath`
    #[serde(alias = "logPath")]
    pub log_path: PathBuf,
}

/// 旧版本对未结束的任务写入零值时间 `0001-01-01T00:00:00Z`，按未设置处理
fn deserialize_end_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let end_time = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(end_time.filter(|t| t.year() > 1))
}

impl TaskStatus {
    pub fn new(
        trace_id: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
        log_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            status: TaskState::Pending,
            start_time: Utc::now(),
            end_time: None,
            error: None,
            source: source.into(),
            destination: destination.into(),
            log_path: log_path.into(),
        }
    }

    pub fn status(&self) -> TaskState {
        self.status
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// 开始传输
    pub fn start(&mut self) -> Result<(), StatusError> {
        self.transition(TaskState::Downloading)
    }

    /// 标记完成
    pub fn complete(&mut self) -> Result<(), StatusError> {
        self.transition(TaskState::Completed)?;
        self.end_time = Some(Utc::now());
        Ok(())
    }

    /// 标记失败
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), StatusError> {
        self.transition(TaskState::Failed)?;
        self.error = Some(error.into());
        self.end_time = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, to: TaskState) -> Result<(), StatusError> {
        if self.status.is_terminal() || to.rank() <= self.status.rank() {
            return Err(StatusError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// 任务状态存储，每个 trace id 对应 `<dir>/<trace_id>.json`
///
/// 同一个 trace id 只会被其所属的任务写入，因此不需要跨进程加锁。
#[derive(Debug, Clone)]
pub struct TaskStore {
    dir: PathBuf,
}

impl TaskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// trace id 必须是单个普通路径分量，不能逃逸出状态目录
    fn record_path(&self, trace_id: &str) -> Option<PathBuf> {
        let mut components = Path::new(trace_id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if name == trace_id => {
                Some(self.dir.join(format!("{}.json", trace_id)))
            }
            _ => None,
        }
    }

    /// 保存任务状态（整体覆盖）
    pub async fn save(&self, task: &TaskStatus) -> Result<(), StatusError> {
        let path = self
            .record_path(&task.trace_id)
            .ok_or_else(|| StatusError::InvalidTraceId(task.trace_id.clone()))?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StatusError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let data = serde_json::to_vec_pretty(task).map_err(|source| StatusError::Encode {
            trace_id: task.trace_id.clone(),
            source,
        })?;

        // 使用临时文件写入，然后原子重命名，读者看不到写了一半的记录
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, data)
            .await
            .map_err(|source| StatusError::Io {
                path: temp_path.clone(),
                source,
            })?;
        fs::rename(&temp_path, &path)
            .await
            .map_err(|source| StatusError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(())
    }

    /// 读取任务状态
    pub async fn load(&self, trace_id: &str) -> Result<TaskStatus, StatusError> {
        let path = self
            .record_path(trace_id)
            .ok_or_else(|| StatusError::NotFound(trace_id.to_string()))?;

        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StatusError::NotFound(trace_id.to_string()))
            }
            Err(source) => return Err(StatusError::Io { path, source }),
        };

        serde_json::from_slice(&data).map_err(|source| StatusError::Parse {
            trace_id: trace_id.to_string(),
            source,
        })
    }
}
