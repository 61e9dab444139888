use super::{TransferEngine, TransferOp, TransferRequest};
use crate::error::EngineError;
use async_trait::async_trait;
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// 错误信息中保留的 stderr 尾部长度
const STDERR_TAIL_CHARS: usize = 1024;

/// 通过子进程调用 rclone
pub struct RcloneEngine {
    program: String,
    log_level: String,
    name: String,
}

impl RcloneEngine {
    pub fn new(program: impl Into<String>, log_level: impl Into<String>) -> Self {
        let program = program.into();
        let name = format!("rclone:{}", program);
        Self {
            program,
            log_level: log_level.into(),
            name,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn spawn_error(&self, source: std::io::Error) -> EngineError {
        EngineError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

#[async_trait]
impl TransferEngine for RcloneEngine {
    async fn transfer(&self, request: &TransferRequest) -> Result<(), EngineError> {
        request.validate()?;

        let mut cmd = self.command();
        cmd.arg(request.op.verb())
            .arg(&request.source)
            .arg(&request.destination)
            .arg("--config")
            .arg(&request.config_path);

        if let Some(log_file) = &request.log_file {
            cmd.arg("--log-file")
                .arg(log_file)
                .arg("--log-level")
                .arg(&self.log_level);
        }

        // 下载时不删除本地已有文件
        if request.op == TransferOp::Download {
            cmd.env("RCLONE_SFTP_NO_REMOVE_DELETED_FILES", "true");
        }

        debug!(
            "执行 rclone {}: {} -> {}",
            request.op.verb(),
            request.source,
            request.destination
        );

        let output = cmd.output().await.map_err(|e| self.spawn_error(e))?;
        check_exit(request.op.verb(), &output)
    }

    async fn obscure(&self, password: &str) -> Result<String, EngineError> {
        // 通过 stdin 传递密码，避免出现在进程参数中
        let mut child = self
            .command()
            .arg("obscure")
            .arg("-")
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(password.as_bytes())
                .await
                .map_err(|e| EngineError::Obscure(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| EngineError::Obscure(e.to_string()))?;

        if !output.status.success() {
            return Err(EngineError::Obscure(stderr_tail(&output.stderr)));
        }

        let obscured = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if obscured.is_empty() {
            return Err(EngineError::Obscure("empty output".to_string()));
        }
        Ok(obscured)
    }

    async fn list(&self, remote: &str, config_path: &Path) -> Result<Vec<String>, EngineError> {
        if remote.trim().is_empty() {
            return Err(EngineError::EmptyEndpoint("remote"));
        }

        let output = self
            .command()
            .arg("lsf")
            .arg(remote)
            .arg("--config")
            .arg(config_path)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;
        check_exit("lsf", &output)?;

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn check_exit(verb: &str, output: &Output) -> Result<(), EngineError> {
    if output.status.success() {
        return Ok(());
    }
    Err(EngineError::Exit {
        verb: verb.to_string(),
        status: output.status.to_string(),
        stderr: stderr_tail(&output.stderr),
    })
}

/// 取 stderr 的末尾部分
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.is_empty() {
        return "no output".to_string();
    }

    let count = text.chars().count();
    if count <= STDERR_TAIL_CHARS {
        text.to_string()
    } else {
        text.chars().skip(count - STDERR_TAIL_CHARS).collect()
    }
}
