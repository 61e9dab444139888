//! 任务状态查询命令

use crate::core::TaskStatus;
use crate::error::StatusError;
use crate::AppState;
use clap::Args;

#[derive(Debug, Clone, Args)]
pub struct StatusArgs {
    /// 任务 trace id
    #[arg(long)]
    pub id: String,
}

/// 按 trace id 读取任务状态
pub async fn lookup(state: &AppState, trace_id: &str) -> Result<TaskStatus, StatusError> {
    state.status_store().load(trace_id.trim()).await
}

/// 以格式化 JSON 输出任务状态
pub fn render(task: &TaskStatus) -> Result<String, StatusError> {
    serde_json::to_string_pretty(task).map_err(|source| StatusError::Encode {
        trace_id: task.trace_id.clone(),
        source,
    })
}

pub async fn run(state: &AppState, args: &StatusArgs) -> Result<String, StatusError> {
    let task = lookup(state, &args.id).await?;
    render(&task)
}
